//! Memory handling for the simulator.
//!
//! This module consists of:
//! - [`Mem`]: The memory.
//! - [`RegFile`]: The register file.

use crate::ast::{Reg, MEM_SIZE, NUM_REGS};

use super::SimErr;

/// Memory. This holds [`MEM_SIZE`] words and is addressed with a `u16`.
///
/// Any access at or above [`MEM_SIZE`] raises [`SimErr::AddressOutOfRange`];
/// the address space never grows.
#[derive(Clone, PartialEq, Eq)]
pub struct Mem(Box<[u16; MEM_SIZE]>);
impl Mem {
    /// Creates new zeroed memory.
    pub fn new() -> Self {
        Self({
            vec![0; MEM_SIZE]
                .into_boxed_slice()
                .try_into()
                .unwrap_or_else(|_| unreachable!("vector should have had {MEM_SIZE} elements"))
        })
    }

    /// Copies a block into this memory, starting at `start`.
    ///
    /// This errors (and writes nothing) if the block does not fit.
    pub fn copy_block(&mut self, start: u16, data: &[u16]) -> Result<(), SimErr> {
        let start = usize::from(start);
        let end = start + data.len();
        if end > MEM_SIZE {
            return Err(SimErr::AddressOutOfRange(end.min(usize::from(u16::MAX)) as u16));
        }
        self.0[start..end].copy_from_slice(data);
        Ok(())
    }

    /// Fallibly gets the word at the provided address.
    pub fn read(&self, addr: u16) -> Result<u16, SimErr> {
        self.0.get(usize::from(addr))
            .copied()
            .ok_or(SimErr::AddressOutOfRange(addr))
    }
    /// Fallibly sets the word at the provided address.
    pub fn write(&mut self, addr: u16, data: u16) -> Result<(), SimErr> {
        let cell = self.0.get_mut(usize::from(addr))
            .ok_or(SimErr::AddressOutOfRange(addr))?;
        *cell = data;
        Ok(())
    }

    /// Gets the words in the provided address range, clamped to the end of memory.
    pub fn window(&self, range: std::ops::Range<u16>) -> &[u16] {
        let end = usize::from(range.end).min(MEM_SIZE);
        let start = usize::from(range.start).min(end);
        &self.0[start..end]
    }
}
impl Default for Mem {
    fn default() -> Self {
        Self::new()
    }
}
impl std::ops::Deref for Mem {
    type Target = [u16];

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}
impl std::fmt::Debug for Mem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 32768 words is too much to print.
        let used = self.0.iter().rposition(|&w| w != 0).map_or(0, |i| i + 1);
        f.debug_struct("Mem")
            .field("used", &used)
            .finish_non_exhaustive()
    }
}

/// The register file.
///
/// This can be addressed with a [`Reg`], using typical array index notation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegFile([u16; NUM_REGS]);
impl RegFile {
    /// Creates a register file with every register zeroed.
    pub fn new() -> Self {
        Self([0; NUM_REGS])
    }
    /// Creates a register file with the given values.
    pub fn from_array(values: [u16; NUM_REGS]) -> Self {
        Self(values)
    }
    /// The values of the registers, in order.
    pub fn as_array(&self) -> &[u16; NUM_REGS] {
        &self.0
    }
}
impl std::ops::Index<Reg> for RegFile {
    type Output = u16;

    fn index(&self, index: Reg) -> &Self::Output {
        &self.0[usize::from(index)]
    }
}
impl std::ops::IndexMut<Reg> for RegFile {
    fn index_mut(&mut self, index: Reg) -> &mut Self::Output {
        &mut self.0[usize::from(index)]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bounds() {
        let mut mem = Mem::new();
        assert_eq!(mem.len(), MEM_SIZE);
        mem.write(32767, 9).unwrap();
        assert_eq!(mem.read(32767).unwrap(), 9);

        assert!(matches!(mem.read(32768), Err(SimErr::AddressOutOfRange(32768))));
        assert!(matches!(mem.write(u16::MAX, 1), Err(SimErr::AddressOutOfRange(u16::MAX))));
    }

    #[test]
    fn copy_block() {
        let mut mem = Mem::new();
        mem.copy_block(10, &[1, 2, 3]).unwrap();
        assert_eq!(mem.window(9..14), &[0, 1, 2, 3, 0]);

        assert!(mem.copy_block(32766, &[1, 2, 3]).is_err());
        assert_eq!(mem.read(32766).unwrap(), 0);
    }

    #[test]
    fn window_clamps() {
        let mem = Mem::new();
        assert_eq!(mem.window(32760..40000).len(), 8);
        assert!(mem.window(40000..40010).is_empty());
    }
}

//! Components relating to the machine's words, registers, and operands.
//!
//! This module holds the addressing-mode rule of the instruction set:
//! every argument word is either a literal (`0..=32767`) or a reference
//! to one of eight registers (`32768..=32775`). Anything above that is undefined.
//!
//! This module consists of:
//! - [`Reg`]: A register index.
//! - [`Operand`]: A decoded argument word.
//! - [`Role`]: Whether an instruction's first argument is read or written.
//! - [`resolve`]: The addressing-mode rule applied to a single word.
//! - [`sim`]: The opcode table and typed instructions.

pub mod sim;

use crate::sim::mem::RegFile;
use crate::sim::SimErr;

/// Number of addressable cells in memory.
pub const MEM_SIZE: usize = 1 << 15;
/// Largest value a literal can hold.
pub const MAX_LITERAL: u16 = 0x7FFF;
/// The word that refers to register 0.
pub const REG_BASE: u16 = 0x8000;
/// The number of registers in the register file.
pub const NUM_REGS: usize = 8;
/// Modulus for all arithmetic.
pub const MODULUS: u32 = 1 << 15;

/// A register. Must be between 0 and 7.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct Reg(pub(crate) u8);
impl Reg {
    /// Creates a register from its index, if the index is between 0 and 7.
    pub fn new(index: u8) -> Option<Self> {
        (usize::from(index) < NUM_REGS).then_some(Reg(index))
    }
    /// The index of this register in the register file.
    pub fn index(self) -> u8 {
        self.0
    }
    /// The word that refers to this register in machine code.
    pub fn word(self) -> u16 {
        REG_BASE + u16::from(self.0)
    }
}
impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}
impl From<Reg> for usize {
    fn from(value: Reg) -> Self {
        usize::from(value.0)
    }
}

/// Register constants!
pub mod reg_consts {
    use super::Reg;

    /// The 0th register in the register file.
    pub const R0: Reg = Reg(0);
    /// The 1st register in the register file.
    pub const R1: Reg = Reg(1);
    /// The 2nd register in the register file.
    pub const R2: Reg = Reg(2);
    /// The 3rd register in the register file.
    pub const R3: Reg = Reg(3);
    /// The 4th register in the register file.
    pub const R4: Reg = Reg(4);
    /// The 5th register in the register file.
    pub const R5: Reg = Reg(5);
    /// The 6th register in the register file.
    pub const R6: Reg = Reg(6);
    /// The 7th register in the register file.
    pub const R7: Reg = Reg(7);
}

/// How an instruction treats its first argument.
///
/// Arguments after the first are always [`Role::Read`].
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Role {
    /// The argument is dereferenced like any other value.
    Read,
    /// The argument names a destination register and must not be dereferenced.
    Write,
}

/// A decoded argument word.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Operand {
    /// A literal value (`0..=32767`).
    Imm(u16),
    /// A register reference (`32768..=32775`).
    Reg(Reg),
}
impl Operand {
    /// Decodes an argument word, erroring if the word is outside the defined domain.
    pub fn decode(word: u16) -> Result<Self, SimErr> {
        match word {
            0..=MAX_LITERAL => Ok(Operand::Imm(word)),
            REG_BASE..=0x8007 => Ok(Operand::Reg(Reg((word - REG_BASE) as u8))),
            _ => Err(SimErr::InvalidOperand(word)),
        }
    }

    /// Decodes an argument word.
    ///
    /// If `strict` is unset, undefined words are masked to their low 15 bits
    /// and treated as literals rather than raising an error.
    pub fn decode_with(word: u16, strict: bool) -> Result<Self, SimErr> {
        match Operand::decode(word) {
            Err(_) if !strict => Ok(Operand::Imm(word & MAX_LITERAL)),
            r => r,
        }
    }

    /// Resolves this operand into the value the instruction sees.
    ///
    /// Literals resolve to themselves.
    /// Registers resolve to their value under [`Role::Read`]
    /// and to their index under [`Role::Write`].
    pub fn resolve(self, role: Role, reg_file: &RegFile) -> u16 {
        match (self, role) {
            (Operand::Imm(n), _) => n,
            (Operand::Reg(r), Role::Read) => reg_file[r],
            (Operand::Reg(r), Role::Write) => u16::from(r.0),
        }
    }

    /// The word this operand was decoded from.
    pub fn word(self) -> u16 {
        match self {
            Operand::Imm(n) => n,
            Operand::Reg(r) => r.word(),
        }
    }
}
impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Imm(n) => std::fmt::Display::fmt(n, f),
            Operand::Reg(r) => std::fmt::Display::fmt(r, f),
        }
    }
}

/// Applies the addressing-mode rule to a raw argument word.
///
/// This is shorthand for [`Operand::decode`] followed by [`Operand::resolve`].
pub fn resolve(word: u16, role: Role, reg_file: &RegFile) -> Result<u16, SimErr> {
    Operand::decode(word).map(|op| op.resolve(role, reg_file))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::reg_consts::{R0, R3, R7};

    fn reg_file() -> RegFile {
        let mut regs = RegFile::new();
        for (i, v) in [11, 22, 33, 44, 55, 66, 77, 88].into_iter().enumerate() {
            regs[Reg(i as u8)] = v;
        }
        regs
    }

    #[test]
    fn literals_resolve_to_themselves() {
        let regs = reg_file();
        for w in [0, 1, 7, 8, 100, 32766, 32767] {
            assert_eq!(resolve(w, Role::Read, &regs).unwrap(), w);
            assert_eq!(resolve(w, Role::Write, &regs).unwrap(), w);
        }
    }

    #[test]
    fn registers_read_and_write() {
        let regs = reg_file();
        for i in 0..8u16 {
            let w = REG_BASE + i;
            assert_eq!(resolve(w, Role::Read, &regs).unwrap(), regs[Reg(i as u8)]);
            assert_eq!(resolve(w, Role::Write, &regs).unwrap(), i);
        }
    }

    #[test]
    fn undefined_words_fail() {
        let regs = reg_file();
        for w in [32776, 40000, u16::MAX] {
            assert!(matches!(resolve(w, Role::Read, &regs), Err(SimErr::InvalidOperand(x)) if x == w));
            assert!(resolve(w, Role::Write, &regs).is_err());
        }
    }

    #[test]
    fn permissive_masks() {
        assert_eq!(Operand::decode_with(32776, false).unwrap(), Operand::Imm(8));
        assert!(Operand::decode_with(32776, true).is_err());
        assert_eq!(Operand::decode_with(32775, false).unwrap(), Operand::Reg(R7));
    }

    #[test]
    fn reg_words() {
        assert_eq!(R0.word(), 32768);
        assert_eq!(R3.to_string(), "r3");
        assert_eq!(Operand::decode(32771).unwrap().word(), 32771);
        assert_eq!(Reg::new(8), None);
    }
}

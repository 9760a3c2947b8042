//! Listing the instructions in memory.
//!
//! The [`Disassembler`] walks memory with the same fetch logic the simulator uses,
//! but without executing anything. `halt` is listed like any other instruction,
//! and words that are not opcodes are listed with a placeholder so that
//! a whole memory image can always be disassembled.
//!
//! ```
//! use synacor_ensemble::disasm::disassemble;
//! use synacor_ensemble::sim::MachineState;
//!
//! let state = MachineState::from_words(&[19, 65, 0]).unwrap();
//! let mut lines = disassemble(&state.mem);
//! assert_eq!(lines.next().unwrap().to_string(), "0: out 65 'A'");
//! assert_eq!(lines.next().unwrap().to_string(), "2: halt");
//! ```

use std::iter::FusedIterator;

use crate::ast::sim::Opcode;
use crate::ast::Operand;
use crate::sim::decode::{self, RawInstr};
use crate::sim::mem::Mem;
use crate::sim::SimErr;

/// Mnemonic listed for words that are not opcodes.
pub const UNKNOWN_MNEMONIC: &str = "???";

/// An argument of a disassembled instruction.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum DisasmArg {
    /// A literal or register reference.
    Operand(Operand),
    /// A word outside of the defined operand domain.
    Undefined(u16),
}
impl DisasmArg {
    /// Classifies an argument word.
    pub fn new(word: u16) -> Self {
        match Operand::decode(word) {
            Ok(op) => DisasmArg::Operand(op),
            Err(_) => DisasmArg::Undefined(word),
        }
    }

    /// The word this argument was read from.
    pub fn word(self) -> u16 {
        match self {
            DisasmArg::Operand(op) => op.word(),
            DisasmArg::Undefined(w) => w,
        }
    }
}
impl std::fmt::Display for DisasmArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisasmArg::Operand(op) => std::fmt::Display::fmt(op, f),
            DisasmArg::Undefined(w) => write!(f, "?{w}"),
        }
    }
}

/// A single disassembled instruction.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DisasmLine {
    /// The address of the instruction.
    pub addr: u16,
    /// The opcode word.
    pub word: u16,
    /// The opcode, if the opcode word is a valid one.
    pub opcode: Option<Opcode>,
    /// The arguments. This is empty for unknown opcodes.
    pub args: Vec<DisasmArg>,
}
impl DisasmLine {
    fn from_raw(raw: &RawInstr, opcode: Option<Opcode>) -> Self {
        let (&word, args) = raw.words().split_first()
            .unwrap_or_else(|| unreachable!("fetched instruction should have an opcode word"));

        Self {
            addr: raw.addr,
            word,
            opcode,
            args: args.iter().copied().map(DisasmArg::new).collect(),
        }
    }

    /// The mnemonic of the instruction.
    pub fn mnemonic(&self) -> &'static str {
        self.opcode.map_or(UNKNOWN_MNEMONIC, Opcode::mnemonic)
    }

    /// The words this line was disassembled from.
    pub fn encode(&self) -> Vec<u16> {
        std::iter::once(self.word)
            .chain(self.args.iter().map(|a| a.word()))
            .collect()
    }

    /// The address right after this instruction.
    pub fn next_addr(&self) -> u16 {
        self.addr + (1 + self.args.len()) as u16
    }
}
impl std::fmt::Display for DisasmLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.addr, self.mnemonic())?;
        if self.opcode.is_none() {
            return write!(f, " ; {}", self.word);
        }

        for arg in &self.args {
            write!(f, " {arg}")?;
        }

        if let (Some(Opcode::Out), [DisasmArg::Operand(Operand::Imm(n))]) = (self.opcode, self.args.as_slice()) {
            match char::from_u32(u32::from(*n)) {
                Some(c) if !c.is_control() => write!(f, " '{c}'")?,
                Some('\n') => f.write_str(" '\\n'")?,
                _ => {}
            }
        }
        Ok(())
    }
}

/// An iterator over the instructions in memory.
///
/// Iteration stops once the next instruction would extend past the end of memory.
#[derive(Debug, Clone)]
pub struct Disassembler<'m> {
    mem: &'m Mem,
    pc: u16,
}
impl<'m> Disassembler<'m> {
    /// Creates a disassembler starting at address 0.
    pub fn new(mem: &'m Mem) -> Self {
        Self::starting_at(mem, 0)
    }

    /// Creates a disassembler starting at the given address.
    pub fn starting_at(mem: &'m Mem, addr: u16) -> Self {
        Self { mem, pc: addr }
    }

    /// The address of the next instruction to list.
    pub fn addr(&self) -> u16 {
        self.pc
    }

    /// Restarts the listing from address 0.
    pub fn restart(&mut self) {
        self.pc = 0;
    }
}
impl Iterator for Disassembler<'_> {
    type Item = DisasmLine;

    fn next(&mut self) -> Option<Self::Item> {
        let mut pc = self.pc;
        let mut raw = RawInstr::new(pc);

        let opcode = match decode::fetch(self.mem, &mut pc, &mut raw) {
            Ok(op) => Some(op),
            Err(SimErr::IllegalOpcode(_)) => None,
            Err(_) => return None,
        };

        self.pc = pc;
        Some(DisasmLine::from_raw(&raw, opcode))
    }
}
impl FusedIterator for Disassembler<'_> {}

/// Lists every instruction in memory, starting from address 0.
pub fn disassemble(mem: &Mem) -> Disassembler<'_> {
    Disassembler::new(mem)
}

#[cfg(test)]
mod test {
    use super::*;

    fn mem(words: &[u16]) -> Mem {
        let mut mem = Mem::new();
        mem.copy_block(0, words).unwrap();
        mem
    }

    const PROGRAM: [u16; 16] = [
        1, 32768, 72,           // set r0 72
        19, 32768,              // out r0
        19, 10,                 // out '\n'
        9, 32769, 32769, 40000, // add r1 r1 ?40000
        0,                      // halt
        17, 0,                  // call 0
        18,                     // ret
        21,                     // noop
    ];

    #[test]
    fn renders_lines() {
        let mem = mem(&PROGRAM);
        let lines: Vec<_> = disassemble(&mem).take(8).map(|l| l.to_string()).collect();

        assert_eq!(lines, [
            "0: set r0 72",
            "3: out r0",
            "5: out 10 '\\n'",
            "7: add r1 r1 ?40000",
            "11: halt",
            "12: call 0",
            "14: ret",
            "15: noop",
        ]);
    }

    #[test]
    fn reencodes_exactly() {
        let mem = mem(&PROGRAM);
        let words: Vec<u16> = disassemble(&mem)
            .take_while(|l| l.addr < PROGRAM.len() as u16)
            .flat_map(|l| l.encode())
            .collect();

        assert_eq!(words, PROGRAM);
    }

    #[test]
    fn unknown_opcodes() {
        let mem = mem(&[22, 30000, 19, 65]);
        let mut dis = disassemble(&mem);

        let line = dis.next().unwrap();
        assert_eq!(line.opcode, None);
        assert!(line.args.is_empty());
        assert_eq!(line.mnemonic(), UNKNOWN_MNEMONIC);
        assert_eq!(line.to_string(), "0: ??? ; 22");
        assert_eq!(line.encode(), [22]);

        assert_eq!(dis.next().unwrap().to_string(), "1: ??? ; 30000");
        assert_eq!(dis.next().unwrap().to_string(), "2: out 65 'A'");
    }

    #[test]
    fn stops_at_end_of_memory() {
        let mut mem = Mem::new();
        // an add at 32766 would need words up to 32769
        mem.write(32766, 9).unwrap();

        let mut dis = Disassembler::starting_at(&mem, 32764);
        assert_eq!(dis.next().map(|l| l.addr), Some(32764));
        assert_eq!(dis.next().map(|l| l.addr), Some(32765));
        assert_eq!(dis.next(), None);
        assert_eq!(dis.next(), None);
        assert_eq!(dis.addr(), 32766);

        // the whole image lists without error
        let zeroes = Mem::new();
        assert_eq!(disassemble(&zeroes).count(), crate::ast::MEM_SIZE);
    }

    #[test]
    fn restarts() {
        let mem = mem(&PROGRAM);
        let mut dis = disassemble(&mem);
        let first = dis.next();
        dis.nth(3);
        assert_eq!(dis.addr(), 12);

        dis.restart();
        assert_eq!(dis.next(), first);
        assert_eq!(first.map(|l| l.next_addr()), Some(3));
    }
}

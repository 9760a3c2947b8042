//! Fetching and decoding instructions from memory.
//!
//! Decoding happens in two stages:
//! - [`fetch`] reads the opcode word and its argument words, advancing the PC
//!   by one for every word read. The words read are kept in a [`RawInstr`].
//! - [`resolve_instr`] applies the addressing-mode rule to each argument,
//!   producing a [`SimInstr`].
//!
//! The disassembler only uses the first stage.

use crate::ast::sim::{Opcode, SimInstr};
use crate::ast::{Operand, Reg, Role};

use super::mem::{Mem, RegFile};
use super::SimErr;

/// The words of an instruction, exactly as they were read from memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInstr {
    /// The address of the first word.
    pub addr: u16,
    words: [u16; 4],
    len: usize,
}
impl RawInstr {
    /// Creates an empty instruction located at the given address.
    pub fn new(addr: u16) -> Self {
        Self { addr, words: [0; 4], len: 0 }
    }

    /// All words read so far (the opcode word, then the argument words).
    pub fn words(&self) -> &[u16] {
        &self.words[..self.len]
    }
    /// The argument words read so far.
    pub fn args(&self) -> &[u16] {
        self.words().get(1..).unwrap_or(&[])
    }

    /// Reads the word at the PC into this instruction and advances the PC.
    pub(crate) fn fetch_word(&mut self, mem: &Mem, pc: &mut u16) -> Result<u16, SimErr> {
        let word = mem.read(*pc)?;
        // a successful read means the PC is below the end of memory
        *pc += 1;

        if let Some(slot) = self.words.get_mut(self.len) {
            *slot = word;
            self.len += 1;
        }
        Ok(word)
    }
}

/// Fetches the instruction at the PC, advancing the PC past it.
///
/// On return (successful or not), `raw` holds every word that was read.
pub fn fetch(mem: &Mem, pc: &mut u16, raw: &mut RawInstr) -> Result<Opcode, SimErr> {
    *raw = RawInstr::new(*pc);

    let word = raw.fetch_word(mem, pc)?;
    let opcode = Opcode::from_word(word).ok_or(SimErr::IllegalOpcode(word))?;
    for _ in 0..opcode.arity() {
        raw.fetch_word(mem, pc)?;
    }

    Ok(opcode)
}

/// Resolves a fetched instruction's arguments against the register file.
///
/// The first argument of a [`Role::Write`] opcode must be a register reference.
/// Every other argument is dereferenced.
///
/// If `strict` is unset, undefined argument words are masked rather than rejected
/// (see [`Operand::decode_with`]).
pub fn resolve_instr(opcode: Opcode, raw: &RawInstr, reg_file: &RegFile, strict: bool) -> Result<SimInstr, SimErr> {
    let args = raw.args();
    let (dest, src) = match (opcode.role(), args.split_first()) {
        (Role::Write, Some((&first, rest))) => (Some(decode_dest(first, strict)?), rest),
        _ => (None, args),
    };

    let mut values = [0; 3];
    for (value, &word) in values.iter_mut().zip(src) {
        *value = Operand::decode_with(word, strict)?.resolve(Role::Read, reg_file);
    }

    SimInstr::new(opcode, dest, &values[..src.len()])
        .ok_or(SimErr::IllegalOpcode(opcode.word()))
}

fn decode_dest(word: u16, strict: bool) -> Result<Reg, SimErr> {
    match Operand::decode_with(word, strict)? {
        Operand::Reg(reg) => Ok(reg),
        Operand::Imm(_)   => Err(SimErr::LiteralDestination(word)),
    }
}

//! The instruction set.
//!
//! [`Opcode`] is the opcode table: for each opcode value, its mnemonic,
//! how many argument words it takes, and how its first argument is treated.
//! [`SimInstr`] is a fully decoded instruction, with every argument resolved.

use super::{Reg, Role};

/// An opcode, as stored in the first word of an instruction.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
#[repr(u16)]
pub enum Opcode {
    #[allow(missing_docs)] Halt = 0,
    #[allow(missing_docs)] Set  = 1,
    #[allow(missing_docs)] Push = 2,
    #[allow(missing_docs)] Pop  = 3,
    #[allow(missing_docs)] Eq   = 4,
    #[allow(missing_docs)] Gt   = 5,
    #[allow(missing_docs)] Jmp  = 6,
    #[allow(missing_docs)] Jt   = 7,
    #[allow(missing_docs)] Jf   = 8,
    #[allow(missing_docs)] Add  = 9,
    #[allow(missing_docs)] Mult = 10,
    #[allow(missing_docs)] Mod  = 11,
    #[allow(missing_docs)] And  = 12,
    #[allow(missing_docs)] Or   = 13,
    #[allow(missing_docs)] Not  = 14,
    #[allow(missing_docs)] Rmem = 15,
    #[allow(missing_docs)] Wmem = 16,
    #[allow(missing_docs)] Call = 17,
    #[allow(missing_docs)] Ret  = 18,
    #[allow(missing_docs)] Out  = 19,
    #[allow(missing_docs)] In   = 20,
    #[allow(missing_docs)] Noop = 21,
}

const OPCODES: [Opcode; 22] = [
    Opcode::Halt, Opcode::Set, Opcode::Push, Opcode::Pop, Opcode::Eq, Opcode::Gt,
    Opcode::Jmp, Opcode::Jt, Opcode::Jf, Opcode::Add, Opcode::Mult, Opcode::Mod,
    Opcode::And, Opcode::Or, Opcode::Not, Opcode::Rmem, Opcode::Wmem, Opcode::Call,
    Opcode::Ret, Opcode::Out, Opcode::In, Opcode::Noop,
];

impl Opcode {
    /// Looks up the opcode for a word, if there is one.
    pub fn from_word(word: u16) -> Option<Self> {
        OPCODES.get(usize::from(word)).copied()
    }

    /// The word this opcode is encoded as.
    pub fn word(self) -> u16 {
        self as u16
    }

    /// The number of argument words following this opcode.
    pub fn arity(self) -> usize {
        match self {
            Opcode::Halt | Opcode::Ret | Opcode::Noop => 0,
            Opcode::Push | Opcode::Pop | Opcode::Jmp | Opcode::Call | Opcode::Out | Opcode::In => 1,
            Opcode::Set | Opcode::Jt | Opcode::Jf | Opcode::Not | Opcode::Rmem | Opcode::Wmem => 2,
            Opcode::Eq | Opcode::Gt | Opcode::Add | Opcode::Mult
            | Opcode::Mod | Opcode::And | Opcode::Or => 3,
        }
    }

    /// How the first argument of this opcode is treated.
    ///
    /// Opcodes without arguments report [`Role::Read`].
    pub fn role(self) -> Role {
        match self {
            Opcode::Set | Opcode::Pop | Opcode::Eq | Opcode::Gt
            | Opcode::Add | Opcode::Mult | Opcode::Mod | Opcode::And
            | Opcode::Or | Opcode::Not | Opcode::Rmem | Opcode::In => Role::Write,

            Opcode::Halt | Opcode::Push | Opcode::Jmp | Opcode::Jt
            | Opcode::Jf | Opcode::Wmem | Opcode::Call | Opcode::Ret
            | Opcode::Out | Opcode::Noop => Role::Read,
        }
    }

    /// The mnemonic of this opcode.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Halt => "halt",
            Opcode::Set  => "set",
            Opcode::Push => "push",
            Opcode::Pop  => "pop",
            Opcode::Eq   => "eq",
            Opcode::Gt   => "gt",
            Opcode::Jmp  => "jmp",
            Opcode::Jt   => "jt",
            Opcode::Jf   => "jf",
            Opcode::Add  => "add",
            Opcode::Mult => "mult",
            Opcode::Mod  => "mod",
            Opcode::And  => "and",
            Opcode::Or   => "or",
            Opcode::Not  => "not",
            Opcode::Rmem => "rmem",
            Opcode::Wmem => "wmem",
            Opcode::Call => "call",
            Opcode::Ret  => "ret",
            Opcode::Out  => "out",
            Opcode::In   => "in",
            Opcode::Noop => "noop",
        }
    }
}
impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// A decoded instruction whose arguments have been resolved.
///
/// Destination arguments are held as [`Reg`]s;
/// every other argument is the value the instruction operates on.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
#[allow(missing_docs)]
pub enum SimInstr {
    Halt,
    Set(Reg, u16),
    Push(u16),
    Pop(Reg),
    Eq(Reg, u16, u16),
    Gt(Reg, u16, u16),
    Jmp(u16),
    Jt(u16, u16),
    Jf(u16, u16),
    Add(Reg, u16, u16),
    Mult(Reg, u16, u16),
    Mod(Reg, u16, u16),
    And(Reg, u16, u16),
    Or(Reg, u16, u16),
    Not(Reg, u16),
    /// Copies the word at an address into a register.
    ///
    /// The word is checked like an argument word: in strict mode, words above 32775 fault.
    /// Register reference words (32768..=32775) are copied as they are,
    /// so they are the only way for a register to hold a value above 32767.
    Rmem(Reg, u16),
    Wmem(u16, u16),
    Call(u16),
    Ret,
    Out(u16),
    In(Reg),
    Noop,
}
impl SimInstr {
    /// Builds an instruction out of an opcode,
    /// its destination register (for [`Role::Write`] opcodes),
    /// and its resolved source arguments.
    ///
    /// This returns `None` if the number of arguments does not fit the opcode.
    pub fn new(opcode: Opcode, dest: Option<Reg>, src: &[u16]) -> Option<Self> {
        let instr = match (opcode, dest, src) {
            (Opcode::Halt, None, &[])       => SimInstr::Halt,
            (Opcode::Set,  Some(a), &[b])    => SimInstr::Set(a, b),
            (Opcode::Push, None, &[a])       => SimInstr::Push(a),
            (Opcode::Pop,  Some(a), &[])     => SimInstr::Pop(a),
            (Opcode::Eq,   Some(a), &[b, c]) => SimInstr::Eq(a, b, c),
            (Opcode::Gt,   Some(a), &[b, c]) => SimInstr::Gt(a, b, c),
            (Opcode::Jmp,  None, &[a])       => SimInstr::Jmp(a),
            (Opcode::Jt,   None, &[a, b])    => SimInstr::Jt(a, b),
            (Opcode::Jf,   None, &[a, b])    => SimInstr::Jf(a, b),
            (Opcode::Add,  Some(a), &[b, c]) => SimInstr::Add(a, b, c),
            (Opcode::Mult, Some(a), &[b, c]) => SimInstr::Mult(a, b, c),
            (Opcode::Mod,  Some(a), &[b, c]) => SimInstr::Mod(a, b, c),
            (Opcode::And,  Some(a), &[b, c]) => SimInstr::And(a, b, c),
            (Opcode::Or,   Some(a), &[b, c]) => SimInstr::Or(a, b, c),
            (Opcode::Not,  Some(a), &[b])    => SimInstr::Not(a, b),
            (Opcode::Rmem, Some(a), &[b])    => SimInstr::Rmem(a, b),
            (Opcode::Wmem, None, &[a, b])    => SimInstr::Wmem(a, b),
            (Opcode::Call, None, &[a])       => SimInstr::Call(a),
            (Opcode::Ret,  None, &[])        => SimInstr::Ret,
            (Opcode::Out,  None, &[a])       => SimInstr::Out(a),
            (Opcode::In,   Some(a), &[])     => SimInstr::In(a),
            (Opcode::Noop, None, &[])        => SimInstr::Noop,
            _ => return None,
        };
        Some(instr)
    }

    /// The opcode of this instruction.
    pub fn opcode(&self) -> Opcode {
        match self {
            SimInstr::Halt          => Opcode::Halt,
            SimInstr::Set(_, _)     => Opcode::Set,
            SimInstr::Push(_)       => Opcode::Push,
            SimInstr::Pop(_)        => Opcode::Pop,
            SimInstr::Eq(_, _, _)   => Opcode::Eq,
            SimInstr::Gt(_, _, _)   => Opcode::Gt,
            SimInstr::Jmp(_)        => Opcode::Jmp,
            SimInstr::Jt(_, _)      => Opcode::Jt,
            SimInstr::Jf(_, _)      => Opcode::Jf,
            SimInstr::Add(_, _, _)  => Opcode::Add,
            SimInstr::Mult(_, _, _) => Opcode::Mult,
            SimInstr::Mod(_, _, _)  => Opcode::Mod,
            SimInstr::And(_, _, _)  => Opcode::And,
            SimInstr::Or(_, _, _)   => Opcode::Or,
            SimInstr::Not(_, _)     => Opcode::Not,
            SimInstr::Rmem(_, _)    => Opcode::Rmem,
            SimInstr::Wmem(_, _)    => Opcode::Wmem,
            SimInstr::Call(_)       => Opcode::Call,
            SimInstr::Ret           => Opcode::Ret,
            SimInstr::Out(_)        => Opcode::Out,
            SimInstr::In(_)         => Opcode::In,
            SimInstr::Noop          => Opcode::Noop,
        }
    }
}

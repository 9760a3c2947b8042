//! A simulator, disassembler, and debugger for a 15-bit virtual machine.
//!
//! The machine has 32768 words of memory, eight registers, an unbounded stack,
//! and 22 opcodes. Its state can be saved to and restored from snapshots.
//!
//! This crate consists of:
//! - [`ast`]: The addressing-mode rule, opcodes, and decoded instructions.
//! - [`sim`]: The machine state, the simulator, the debugger, and snapshots.
//! - [`disasm`]: A disassembler over memory.
//! - [`err`]: The error interface shared by every error type here.

#![warn(missing_docs)]

pub mod ast;
pub mod sim;
pub mod disasm;
pub mod err;

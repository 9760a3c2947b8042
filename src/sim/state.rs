//! The machine state.
//!
//! [`MachineState`] is plain data: everything the execution engine mutates
//! and everything a snapshot has to persist. It carries no behavior besides
//! construction from a program image.

use std::borrow::Cow;
use std::collections::VecDeque;

use byteorder::{ByteOrder, LittleEndian};

use crate::ast::MEM_SIZE;

use super::mem::{Mem, RegFile};

/// Errors from turning a program image into a [`MachineState`].
#[derive(Debug, PartialEq, Eq)]
pub enum LoadErr {
    /// The image has an odd number of bytes and cannot be split into 16-bit words.
    OddLength(usize),
    /// The image has more words than fit in memory.
    TooLarge(usize),
}
impl std::fmt::Display for LoadErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadErr::OddLength(n) => write!(f, "program image has an odd number of bytes ({n})"),
            LoadErr::TooLarge(n)  => write!(f, "program image has {n} words, which does not fit in memory"),
        }
    }
}
impl std::error::Error for LoadErr {}
impl crate::err::Error for LoadErr {
    fn help(&self) -> Option<Cow<str>> {
        match self {
            LoadErr::OddLength(_) => Some("program images are sequences of little-endian 16-bit words".into()),
            LoadErr::TooLarge(_)  => Some(format!("memory holds at most {MEM_SIZE} words").into()),
        }
    }
}

/// The full state of a machine.
///
/// A state is created once from a program image and mutated in place by
/// [`Simulator`] until it halts, faults, or is written to a snapshot.
///
/// [`Simulator`]: super::Simulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineState {
    /// The machine's memory.
    ///
    /// Note that this is held in the heap, as it is too large for the stack.
    pub mem: Mem,
    /// The machine's register file.
    pub reg_file: RegFile,
    /// The operand stack. The top of the stack is the last element.
    pub stack: Vec<u16>,
    /// The address of the next word to fetch.
    pub pc: u16,
    /// Pending input characters, consumed one at a time by `in`.
    ///
    /// Each entry is one character, so every entry is at most 32767.
    pub input: VecDeque<u16>,
    /// Whether `halt` has executed (or `ret` ran with an empty stack).
    pub halted: bool,
}
impl MachineState {
    /// Creates a state with zeroed memory and registers, an empty stack, and PC at 0.
    pub fn new() -> Self {
        Self {
            mem: Mem::new(),
            reg_file: RegFile::new(),
            stack: vec![],
            pc: 0,
            input: VecDeque::new(),
            halted: false,
        }
    }

    /// Creates a state with the given words loaded into memory starting at address 0.
    pub fn from_words(words: &[u16]) -> Result<Self, LoadErr> {
        let mut state = Self::new();
        state.mem.copy_block(0, words)
            .map_err(|_| LoadErr::TooLarge(words.len()))?;
        Ok(state)
    }

    /// Creates a state from a program image of little-endian 16-bit words.
    pub fn from_image_bytes(bytes: &[u8]) -> Result<Self, LoadErr> {
        if bytes.len() % 2 != 0 {
            return Err(LoadErr::OddLength(bytes.len()));
        }
        let mut words = vec![0; bytes.len() / 2];
        LittleEndian::read_u16_into(bytes, &mut words);

        Self::from_words(&words)
    }
}
impl Default for MachineState {
    fn default() -> Self {
        Self::new()
    }
}

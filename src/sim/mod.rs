//! Simulating and execution of machine code.
//!
//! This module consists of:
//! - [`Simulator`]: The execution engine, which steps a [`MachineState`].
//! - [`state`]: The module holding the machine state.
//! - [`mem`]: The module handling memory and the register file.
//! - [`decode`]: The module that fetches and decodes instructions.
//! - [`io`]: The module handling simulator IO.
//! - [`debug`]: The module holding the breakpoint debugger.
//! - [`snapshot`]: The module that persists and restores machine states.

pub mod mem;
pub mod state;
pub mod decode;
pub mod io;
pub mod debug;
pub mod snapshot;

use std::borrow::Cow;

use std::collections::VecDeque;

use crate::ast::sim::SimInstr;
use crate::ast::{Operand, MAX_LITERAL, MEM_SIZE, MODULUS};
use io::{IODevice, InputLine, SAVE_USAGE};

use self::decode::RawInstr;
pub use self::state::MachineState;

/// Errors that can occur during simulation.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SimErr {
    /// The opcode word does not name an instruction.
    IllegalOpcode(u16),
    /// An argument word is outside of `0..=32775`.
    InvalidOperand(u16),
    /// An instruction that writes to its first argument was given a literal there.
    LiteralDestination(u16),
    /// A value was popped from an empty stack.
    StackUnderflow,
    /// `mod` was called with a divisor of zero.
    DivideByZero,
    /// Memory was accessed at an address past the end of memory.
    AddressOutOfRange(u16),
    /// `in` was executed, but the input stream has closed.
    InputClosed,
}
impl std::fmt::Display for SimErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimErr::IllegalOpcode(w)      => write!(f, "simulator executed illegal opcode {w}"),
            SimErr::InvalidOperand(w)     => write!(f, "invalid operand word {w}"),
            SimErr::LiteralDestination(w) => write!(f, "destination operand {w} is not a register"),
            SimErr::StackUnderflow        => f.write_str("stack underflow"),
            SimErr::DivideByZero          => f.write_str("division by zero"),
            SimErr::AddressOutOfRange(a)  => write!(f, "memory address {a} is out of range"),
            SimErr::InputClosed           => f.write_str("input stream closed"),
        }
    }
}
impl std::error::Error for SimErr {}
impl crate::err::Error for SimErr {
    fn help(&self) -> Option<Cow<str>> {
        match self {
            SimErr::IllegalOpcode(_)      => Some("opcodes are numbered 0 through 21".into()),
            SimErr::InvalidOperand(_)     => Some("operands must be literals (0-32767) or registers (32768-32775)".into()),
            SimErr::LiteralDestination(_) => Some("this instruction stores its result, so its first operand must be a register (32768-32775)".into()),
            SimErr::StackUnderflow        => None,
            SimErr::DivideByZero          => None,
            SimErr::AddressOutOfRange(_)  => Some(format!("memory addresses range from 0 to {}", MEM_SIZE - 1).into()),
            SimErr::InputClosed           => Some("the program asked for input after the input ended".into()),
        }
    }
}

/// A fatal error raised while executing an instruction.
///
/// This carries the location and words of the instruction that raised the error.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SimFault {
    /// The address of the faulting instruction.
    pub pc: u16,
    /// The words of the faulting instruction that were read (opcode first).
    pub instr: Vec<u16>,
    /// The error.
    pub err: SimErr,
}
impl std::fmt::Display for SimFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (at pc {}, instruction words {:?})", self.err, self.pc, self.instr)
    }
}
impl std::error::Error for SimFault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.err)
    }
}
impl crate::err::Error for SimFault {
    fn help(&self) -> Option<Cow<str>> {
        crate::err::Error::help(&self.err)
    }
}

/// Configuration flags for [`Simulator`].
///
/// Read the field descriptions for more details.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SimFlags {
    /// Whether strict mode is enabled.
    ///
    /// In strict mode, argument words in `32776..=65535` raise [`SimErr::InvalidOperand`].
    /// Otherwise, they are masked to their low 15 bits and treated as literals.
    pub strict: bool,

    /// The line queued as input before a `save <path>` snapshot is written.
    ///
    /// Both the running machine and any machine resumed from the snapshot
    /// read this line next.
    pub save_followup: String,
}
impl Default for SimFlags {
    /// The default flags.
    ///
    /// They are defined as follows:
    /// - `strict`: true
    /// - `save_followup`: `"look"`
    fn default() -> Self {
        Self { strict: true, save_followup: String::from("look") }
    }
}

/// Executes machine code.
///
/// The simulator holds no machine state itself.
/// It steps a [`MachineState`] it is given, performing IO through a given [`IODevice`].
#[derive(Debug, Clone, Default)]
pub struct Simulator {
    /// Configuration settings for the simulator.
    pub flags: SimFlags,
}
impl Simulator {
    /// Creates a new simulator with the given flags.
    pub fn new(flags: SimFlags) -> Self {
        Self { flags }
    }

    /// Runs until the tripwire condition returns false, or until the machine halts.
    fn run_while<IO>(
        &self,
        state: &mut MachineState,
        io: &mut IO,
        mut tripwire: impl FnMut(&MachineState) -> bool
    ) -> Result<(), SimFault>
        where IO: IODevice + ?Sized
    {
        while !state.halted && tripwire(state) {
            self.step(state, io)?;
        }
        Ok(())
    }

    /// Executes the program until it halts.
    pub fn run<IO: IODevice + ?Sized>(&self, state: &mut MachineState, io: &mut IO) -> Result<(), SimFault> {
        self.run_while(state, io, |_| true)
    }

    /// Executes the program with a limit on how many steps to execute.
    pub fn run_with_limit<IO: IODevice + ?Sized>(&self, state: &mut MachineState, io: &mut IO, max_steps: u64) -> Result<(), SimFault> {
        let mut steps = 0;
        self.run_while(state, io, |_| {
            steps += 1;
            steps <= max_steps
        })
    }

    /// Simulates one step, executing one instruction.
    ///
    /// This does nothing if the machine has halted.
    ///
    /// If the instruction raises an error, the PC is moved back to the start of the
    /// instruction and no other part of the state is changed.
    pub fn step<IO: IODevice + ?Sized>(&self, state: &mut MachineState, io: &mut IO) -> Result<(), SimFault> {
        if state.halted { return Ok(()) };

        let start = state.pc;
        let mut raw = RawInstr::new(start);
        self.step_inner(state, io, &mut raw)
            .map_err(|err| {
                state.pc = start;
                SimFault { pc: start, instr: raw.words().to_vec(), err }
            })
    }

    fn step_inner<IO: IODevice + ?Sized>(&self, state: &mut MachineState, io: &mut IO, raw: &mut RawInstr) -> Result<(), SimErr> {
        let opcode = decode::fetch(&state.mem, &mut state.pc, raw)?;
        let instr = decode::resolve_instr(opcode, raw, &state.reg_file, self.flags.strict)?;
        log::trace!("{:5}: {instr:?}", raw.addr);

        match instr {
            SimInstr::Halt => {
                state.halted = true;
                log::info!("machine halted at {}", raw.addr);
            },
            SimInstr::Set(a, b) => state.reg_file[a] = b,
            SimInstr::Push(a) => state.stack.push(a),
            SimInstr::Pop(a) => {
                let value = state.stack.pop().ok_or(SimErr::StackUnderflow)?;
                state.reg_file[a] = value;
            },
            SimInstr::Eq(a, b, c) => state.reg_file[a] = u16::from(b == c),
            SimInstr::Gt(a, b, c) => state.reg_file[a] = u16::from(b > c),
            SimInstr::Jmp(a) => state.pc = a,
            SimInstr::Jt(a, b) => if a != 0 { state.pc = b },
            SimInstr::Jf(a, b) => if a == 0 { state.pc = b },
            SimInstr::Add(a, b, c) => state.reg_file[a] = wrap(u32::from(b) + u32::from(c)),
            SimInstr::Mult(a, b, c) => state.reg_file[a] = wrap(u32::from(b) * u32::from(c)),
            SimInstr::Mod(a, b, c) => {
                if c == 0 { return Err(SimErr::DivideByZero) };
                state.reg_file[a] = b % c;
            },
            SimInstr::And(a, b, c) => state.reg_file[a] = b & c,
            SimInstr::Or(a, b, c) => state.reg_file[a] = b | c,
            SimInstr::Not(a, b) => state.reg_file[a] = !b & MAX_LITERAL,
            SimInstr::Rmem(a, b) => {
                let word = state.mem.read(b)?;
                state.reg_file[a] = Operand::decode_with(word, self.flags.strict)?.word();
            },
            SimInstr::Wmem(a, b) => state.mem.write(a, b)?,
            SimInstr::Call(a) => {
                state.stack.push(state.pc);
                state.pc = a;
            },
            SimInstr::Ret => match state.stack.pop() {
                Some(addr) => state.pc = addr,
                None => {
                    // returning from the outermost frame ends the program
                    state.halted = true;
                    log::info!("machine returned with an empty stack at {}", raw.addr);
                }
            },
            SimInstr::Out(a) => {
                let ch = char::from_u32(u32::from(a)).unwrap_or(char::REPLACEMENT_CHARACTER);
                io.write_str(ch.encode_utf8(&mut [0; 4]));
            },
            SimInstr::In(a) => {
                let ch = self.next_input(state, io, raw.addr)?;
                state.reg_file[a] = ch;
            },
            SimInstr::Noop => {},
        }

        Ok(())
    }

    /// Takes the next input character, reading a new line if the input buffer is empty.
    ///
    /// Reserved `save` commands are handled here and never reach the program.
    fn next_input<IO: IODevice + ?Sized>(&self, state: &mut MachineState, io: &mut IO, instr_addr: u16) -> Result<u16, SimErr> {
        loop {
            if let Some(ch) = state.input.pop_front() {
                return Ok(ch);
            }

            let line = io.read_line().ok_or(SimErr::InputClosed)?;
            match InputLine::parse(&line) {
                InputLine::Text(text) => queue_line(&mut state.input, text),
                InputLine::SaveUsage => io.write_str(SAVE_USAGE),
                InputLine::Save(path) => {
                    queue_line(&mut state.input, &self.flags.save_followup);
                    save_from_input(state, io, instr_addr, path);
                },
            }
        }
    }
}

/// Character queued in place of input characters that do not fit in a word.
pub const UNREPRESENTABLE_INPUT: u16 = b'?' as u16;

/// Queues a line of input, one entry per character, followed by a newline.
fn queue_line(input: &mut VecDeque<u16>, line: &str) {
    for ch in line.chars() {
        let word = u16::try_from(u32::from(ch))
            .ok()
            .filter(|&w| w <= MAX_LITERAL)
            .unwrap_or_else(|| {
                log::warn!("input character {ch:?} does not fit in a word, replacing it");
                UNREPRESENTABLE_INPUT
            });
        input.push_back(word);
    }
    input.push_back(u16::from(b'\n'));
}

/// Writes a snapshot in the middle of an `in` instruction.
///
/// The snapshot's PC points at the `in` instruction itself,
/// so the resumed machine executes it again and reads from the saved input buffer.
fn save_from_input<IO: IODevice + ?Sized>(state: &mut MachineState, io: &mut IO, instr_addr: u16, path: &str) {
    let resume_pc = std::mem::replace(&mut state.pc, instr_addr);
    let result = snapshot::write_file(path, state);
    state.pc = resume_pc;

    match result {
        Ok(()) => {
            log::debug!("saved snapshot to {path} (pc {instr_addr})");
            io.write_str(&format!("state saved to {path}\n"));
        },
        Err(e) => {
            log::warn!("could not save snapshot to {path}: {e}");
            io.write_str(&format!("could not save to {path}: {e}\n"));
        }
    }
}

fn wrap(n: u32) -> u16 {
    (n % MODULUS) as u16
}

#[cfg(test)]
mod test {
    use super::*;
    use super::io::{BufferedIO, EmptyIO};
    use crate::ast::reg_consts::{R0, R1, R2};

    const R0W: u16 = 32768;
    const R1W: u16 = 32769;
    const R2W: u16 = 32770;

    fn chars(s: &str) -> Vec<u16> {
        s.chars().map(|c| c as u16).collect()
    }

    fn run(words: &[u16], io: &mut BufferedIO) -> (MachineState, Result<(), SimFault>) {
        let mut state = MachineState::from_words(words).unwrap();
        let result = Simulator::default().run_with_limit(&mut state, io, 10_000);
        (state, result)
    }

    #[test]
    fn out_then_halt() {
        let mut io = BufferedIO::default();
        let (state, result) = run(&[19, 65, 0], &mut io);
        result.unwrap();
        assert_eq!(io.output_str(), "A");
        assert!(state.halted);
        assert_eq!(state.pc, 3);
    }

    #[test]
    fn set_and_push() {
        let (state, result) = run(&[1, R0W, 4, 1, R1W, 1, 2, R0W, 2, R1W, 0], &mut BufferedIO::default());
        result.unwrap();
        assert_eq!(state.stack, [4, 1]);
        assert_eq!(state.reg_file[R0], 4);
        assert_eq!(state.reg_file[R1], 1);
    }

    #[test]
    fn pop_empty_faults_without_mutation() {
        let mut state = MachineState::from_words(&[1, R0W, 9, 3, R0W, 0]).unwrap();
        let sim = Simulator::default();
        let mut io = BufferedIO::default();
        sim.step(&mut state, &mut io).unwrap();

        let before = state.clone();
        let fault = sim.run(&mut state, &mut io).unwrap_err();
        assert_eq!(fault, SimFault { pc: 3, instr: vec![3, R0W], err: SimErr::StackUnderflow });
        assert_eq!(state, before);
    }

    #[test]
    fn mod_by_zero() {
        let (state, result) = run(&[11, R0W, 7, 0, 0], &mut BufferedIO::default());
        let fault = result.unwrap_err();
        assert_eq!(fault.err, SimErr::DivideByZero);
        assert_eq!(fault.instr, [11, R0W, 7, 0]);
        assert_eq!(state.reg_file[R0], 0);
        assert_eq!(state.pc, 0);
        assert!(!state.halted);
    }

    #[test]
    fn arithmetic_wraps() {
        let (state, result) = run(&[
            9, R0W, 32758, 15,     // add
            10, R1W, 32767, 32767, // mult
            11, R2W, 17, 5,        // mod
            0
        ], &mut BufferedIO::default());
        result.unwrap();
        assert_eq!(state.reg_file[R0], 5);
        assert_eq!(state.reg_file[R1], 1);
        assert_eq!(state.reg_file[R2], 2);
    }

    #[test]
    fn add_and_mult_stay_in_range() {
        let sim = Simulator::default();
        for (b, c) in [(0, 0), (1, 32767), (32767, 32767), (16384, 16384), (12345, 23456), (181, 181)] {
            for op in [9, 10] {
                let mut state = MachineState::from_words(&[op, R0W, b, c, 0]).unwrap();
                sim.run(&mut state, &mut EmptyIO).unwrap();
                let r = state.reg_file[R0];
                assert!(r <= MAX_LITERAL, "{op} {b} {c} = {r}");
                let expected = if op == 9 { (b as u32 + c as u32) % 32768 } else { (b as u32 * c as u32) % 32768 };
                assert_eq!(u32::from(r), expected);
            }
        }
    }

    #[test]
    fn not_is_15_bit() {
        let sim = Simulator::default();
        for b in [0, 1, 0x5555, 0x7FFF, 12345] {
            let mut state = MachineState::from_words(&[14, R0W, b, 0]).unwrap();
            sim.run(&mut state, &mut EmptyIO).unwrap();
            assert_eq!(state.reg_file[R0], !b & 0x7FFF);
        }
    }

    #[test]
    fn comparisons_and_bits() {
        let (state, result) = run(&[
            4, R0W, 3, 3,
            5, R1W, 3, 4,
            12, R2W, 0b1100, 0b1010,
            13, 32771, 0b1100, 0b1010,
            0
        ], &mut BufferedIO::default());
        result.unwrap();
        assert_eq!(state.reg_file.as_array()[..4], [1, 0, 0b1000, 0b1110]);
    }

    #[test]
    fn jumps() {
        // jt skips the out, jf does not jump, jmp lands on the halt
        let mut io = BufferedIO::default();
        let (state, result) = run(&[
            7, 1, 5,       // 0: jt 1 5
            19, 88,        // 3: out 'X'
            8, 1, 3,       // 5: jf 1 3
            19, 89,        // 8: out 'Y'
            6, 14,         // 10: jmp 14
            19, 90,        // 12: out 'Z'
            0,             // 14: halt
        ], &mut io);
        result.unwrap();
        assert_eq!(io.output_str(), "Y");
        assert_eq!(state.pc, 15);
    }

    #[test]
    fn call_and_ret() {
        let mut io = BufferedIO::default();
        let (state, result) = run(&[
            17, 5,     // 0: call 5
            19, 66,    // 2: out 'B'
            18,        // 4: ret (empty stack, halts)
            19, 65,    // 5: out 'A'
            18,        // 7: ret
        ], &mut io);
        result.unwrap();
        assert_eq!(io.output_str(), "AB");
        assert!(state.halted);
        assert!(state.stack.is_empty());
    }

    #[test]
    fn memory_access() {
        let (state, result) = run(&[
            16, 100, 42,    // wmem 100 42
            15, R0W, 100,   // rmem r0 100
            1, R1W, 32767,
            9, R1W, R1W, 1, // r1 = 0 (wraps)
            0
        ], &mut BufferedIO::default());
        result.unwrap();
        assert_eq!(state.mem.read(100).unwrap(), 42);
        assert_eq!(state.reg_file[R0], 42);
        assert_eq!(state.reg_file[R1], 0);
    }

    #[test]
    fn rmem_checks_words() {
        // rmem r0 4, with an undefined word at 4
        let words = [15, R0W, 4, 0, 40000];
        let (state, result) = run(&words, &mut BufferedIO::default());
        assert_eq!(result.unwrap_err(), SimFault { pc: 0, instr: vec![15, R0W, 4], err: SimErr::InvalidOperand(40000) });
        assert_eq!(state.reg_file[R0], 0);
        assert_eq!(state.pc, 0);

        let mut state = MachineState::from_words(&words).unwrap();
        let sim = Simulator::new(SimFlags { strict: false, ..Default::default() });
        sim.run(&mut state, &mut EmptyIO).unwrap();
        assert_eq!(state.reg_file[R0], 40000 & MAX_LITERAL);

        // register reference words are copied as is
        let (state, result) = run(&[15, R0W, 4, 0, R2W], &mut BufferedIO::default());
        result.unwrap();
        assert_eq!(state.reg_file[R0], R2W);
    }

    #[test]
    fn input_lines() {
        let mut io = BufferedIO::new(["hi"]);
        let (state, result) = run(&[20, R0W, 20, R1W, 20, R2W, 0], &mut io);
        result.unwrap();
        assert_eq!(state.reg_file.as_array()[..3], [b'h' as u16, b'i' as u16, b'\n' as u16]);
        assert!(state.input.is_empty());
    }

    #[test]
    fn input_is_per_character() {
        // in r0, out r0, in r1, out r1
        let program = [20, R0W, 19, R0W, 20, R1W, 19, R1W, 0];
        let mut io = BufferedIO::new(["é"]);
        let (state, result) = run(&program, &mut io);
        result.unwrap();
        assert_eq!(state.reg_file[R0], 233);
        assert_eq!(state.reg_file[R1], u16::from(b'\n'));
        assert_eq!(io.output_str(), "é\n");

        // characters past 32767 do not fit in a register
        let mut io = BufferedIO::new(["\u{A66E}"]);
        let (state, result) = run(&program, &mut io);
        result.unwrap();
        assert_eq!(state.reg_file[R0], UNREPRESENTABLE_INPUT);
        assert_eq!(io.output_str(), "?\n");
    }

    #[test]
    fn input_closed() {
        let (_, result) = run(&[20, R0W, 0], &mut BufferedIO::default());
        assert_eq!(result.unwrap_err().err, SimErr::InputClosed);
    }

    #[test]
    fn bare_save_prints_usage() {
        let mut io = BufferedIO::new(["save", "save a b", "x"]);
        let (state, result) = run(&[20, R0W, 0], &mut io);
        result.unwrap();
        assert_eq!(io.output_str(), SAVE_USAGE.repeat(2));
        assert_eq!(state.reg_file[R0], u16::from(b'x'));
        assert_eq!(state.input, [u16::from(b'\n')]);
    }

    #[test]
    fn save_and_resume() {
        let path = std::env::temp_dir().join(format!("synacor-ensemble-save-{}.snap", std::process::id()));
        let path_str = path.to_string_lossy().into_owned();

        // echo one character of input, then halt
        let program = [20, R0W, 19, R0W, 0];
        let mut io = BufferedIO::new([format!("save {path_str}")]);
        let (state, result) = run(&program, &mut io);
        result.unwrap();
        assert!(io.output_str().ends_with("l"));
        assert_eq!(state.input, chars("ook\n"));

        let mut resumed = snapshot::read_file(&path).unwrap();
        assert_eq!(resumed.pc, 0);
        assert_eq!(resumed.input, chars("look\n"));

        let mut io = BufferedIO::default();
        Simulator::default().run(&mut resumed, &mut io).unwrap();
        assert_eq!(io.output_str(), "l");
        assert_eq!(resumed.reg_file, state.reg_file);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn failed_save_continues() {
        let mut io = BufferedIO::new(["save /nonexistent-dir/for/sure/x.snap"]);
        let (state, result) = run(&[20, R0W, 0], &mut io);
        result.unwrap();
        assert!(io.output_str().starts_with("could not save"));
        assert_eq!(state.reg_file[R0], u16::from(b'l'));
    }

    #[test]
    fn strictness() {
        let words = [2, 40000, 0];
        let (_, result) = run(&words, &mut BufferedIO::default());
        assert_eq!(result.unwrap_err().err, SimErr::InvalidOperand(40000));

        let mut state = MachineState::from_words(&words).unwrap();
        let sim = Simulator::new(SimFlags { strict: false, ..Default::default() });
        sim.run(&mut state, &mut EmptyIO).unwrap();
        assert_eq!(state.stack, [40000 & 0x7FFF]);
    }

    #[test]
    fn faults() {
        let (_, result) = run(&[22], &mut BufferedIO::default());
        assert_eq!(result.unwrap_err(), SimFault { pc: 0, instr: vec![22], err: SimErr::IllegalOpcode(22) });

        let (_, result) = run(&[1, 5, 5, 0], &mut BufferedIO::default());
        assert_eq!(result.unwrap_err().err, SimErr::LiteralDestination(5));

        // r0 = mem[7] = 32770, then r1 = mem[r0]
        let (_, result) = run(&[15, R0W, 7, 15, R1W, R0W, 0, 32770], &mut BufferedIO::default());
        assert_eq!(result.unwrap_err(), SimFault { pc: 3, instr: vec![15, R1W, R0W], err: SimErr::AddressOutOfRange(32770) });
    }

    #[test]
    fn step_after_halt() {
        let mut state = MachineState::from_words(&[0, 19, 65]).unwrap();
        let sim = Simulator::default();
        let mut io = BufferedIO::default();
        sim.step(&mut state, &mut io).unwrap();
        sim.step(&mut state, &mut io).unwrap();
        assert!(state.halted);
        assert_eq!(state.pc, 1);
        assert!(io.output().is_empty());
    }

    #[test]
    fn run_with_limit_stops() {
        // jmp 0 forever
        let mut state = MachineState::from_words(&[6, 0]).unwrap();
        Simulator::default().run_with_limit(&mut state, &mut EmptyIO, 50).unwrap();
        assert!(!state.halted);
        assert_eq!(state.pc, 0);
    }
}

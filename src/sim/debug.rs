//! Utilities to debug simulation.
//!
//! The key type here is [`Debugger`], which wraps [`Simulator::step`] and pauses
//! before an instruction executes when single-stepping or when the PC hits a breakpoint.
//! While paused, it reads [`DebugCommand`]s from a console until told to step or continue.
//!
//! The console is any [`IODevice`], separate from the one the program uses.
//! The command language is:
//! - `s`: execute one instruction, then pause again
//! - `c`: run until the next breakpoint
//! - `b`: list breakpoints
//! - `b <addr>`: toggle a breakpoint at an address
//! - `d`: display the machine state
use std::collections::BTreeSet;
use std::fmt::Write as _;

use logos::{Lexer, Logos};

use crate::ast::sim::Opcode;
use crate::ast::{Reg, MEM_SIZE, NUM_REGS};

use super::io::IODevice;
use super::{MachineState, SimFault, Simulator};

/// Prompt written to the console when paused.
pub const PROMPT: &str = "(debug) ";

/// Any errors raised while reading a debugger command.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum CommandErr {
    /// A character that does not occur in any command.
    #[default]
    InvalidSymbol,
    /// A number that is too large to be an address.
    AddressOutOfRange(u32),
    /// A line with no command on it.
    Empty,
    /// Recognized tokens in an unrecognized order.
    Unrecognized,
}
impl std::fmt::Display for CommandErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandErr::InvalidSymbol        => f.write_str("unrecognized symbol"),
            CommandErr::AddressOutOfRange(a) => write!(f, "address {a} is out of range"),
            CommandErr::Empty                => f.write_str("no command given"),
            CommandErr::Unrecognized         => f.write_str("unrecognized command"),
        }
    }
}
impl std::error::Error for CommandErr {}
impl crate::err::Error for CommandErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            CommandErr::AddressOutOfRange(_) => Some(format!("addresses range from 0 to {}", MEM_SIZE - 1).into()),
            _ => Some("commands are s (step), c (continue), b (list breakpoints), b <addr> (toggle breakpoint), d (display)".into()),
        }
    }
}

#[derive(Debug, Logos, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+", error = CommandErr)]
enum Token {
    #[token("s")]
    Step,
    #[token("c")]
    Continue,
    #[token("b")]
    Break,
    #[token("d")]
    Display,
    #[regex(r"\d+", lex_addr)]
    Addr(u16),
}
fn lex_addr(lx: &mut Lexer<'_, Token>) -> Result<u16, CommandErr> {
    // anything that does not fit in a u32 is certainly out of range
    let n = lx.slice().parse::<u32>().unwrap_or(u32::MAX);
    match u16::try_from(n) {
        Ok(addr) if usize::from(addr) < MEM_SIZE => Ok(addr),
        _ => Err(CommandErr::AddressOutOfRange(n)),
    }
}

/// A command given to a paused [`Debugger`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DebugCommand {
    /// Execute one instruction, then pause.
    Step,
    /// Run until the next breakpoint.
    Continue,
    /// List the breakpoints.
    ListBreakpoints,
    /// Add a breakpoint at this address, or remove it if it exists.
    ToggleBreakpoint(u16),
    /// Display the machine state.
    Display,
}
impl std::str::FromStr for DebugCommand {
    type Err = CommandErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens = Token::lexer(s).collect::<Result<Vec<_>, _>>()?;

        match tokens.as_slice() {
            [] => Err(CommandErr::Empty),
            [Token::Step]     => Ok(DebugCommand::Step),
            [Token::Continue] => Ok(DebugCommand::Continue),
            [Token::Break]    => Ok(DebugCommand::ListBreakpoints),
            &[Token::Break, Token::Addr(addr)] => Ok(DebugCommand::ToggleBreakpoint(addr)),
            [Token::Display]  => Ok(DebugCommand::Display),
            _ => Err(CommandErr::Unrecognized),
        }
    }
}

/// A set of breakpoint addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Breakpoints(BTreeSet<u16>);
impl Breakpoints {
    /// Creates an empty breakpoint set.
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Adds a breakpoint at the address if there is none, and removes it otherwise.
    ///
    /// This returns whether a breakpoint now exists at the address,
    /// or an error if the address is outside of memory.
    pub fn toggle(&mut self, addr: u16) -> Result<bool, CommandErr> {
        if usize::from(addr) >= MEM_SIZE {
            return Err(CommandErr::AddressOutOfRange(u32::from(addr)));
        }
        match self.0.remove(&addr) {
            true  => Ok(false),
            false => Ok(self.0.insert(addr)),
        }
    }

    /// Checks whether there is a breakpoint at the address.
    pub fn contains(&self, addr: u16) -> bool {
        self.0.contains(&addr)
    }

    /// The breakpoint addresses, in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }

    /// Checks whether there are no breakpoints.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// What the debugger does after a pause.
enum Resume {
    Step,
    Continue,
}

/// An interactive debugger wrapped around a [`Simulator`].
#[derive(Debug, Clone)]
pub struct Debugger {
    /// Breakpoints for the debugger.
    pub breakpoints: Breakpoints,
    /// How many words on each side of the PC to show when displaying memory.
    pub memory_window: u16,
    stepping: bool,
}
impl Debugger {
    /// Creates a debugger in single-step mode with no breakpoints.
    pub fn new() -> Self {
        Self {
            breakpoints: Breakpoints::new(),
            memory_window: 5,
            stepping: true,
        }
    }

    /// Creates a debugger in single-step mode with the given breakpoints.
    pub fn with_breakpoints(addrs: impl IntoIterator<Item = u16>) -> Result<Self, CommandErr> {
        let mut dbg = Self::new();
        for addr in addrs {
            if !dbg.breakpoints.contains(addr) {
                dbg.breakpoints.toggle(addr)?;
            }
        }
        Ok(dbg)
    }

    /// Whether the debugger pauses before every instruction.
    pub fn is_stepping(&self) -> bool {
        self.stepping
    }

    /// Checks whether the debugger would pause before the next instruction.
    pub fn should_pause(&self, state: &MachineState) -> bool {
        self.stepping || self.breakpoints.contains(state.pc)
    }

    /// Executes one instruction, first pausing for commands if needed.
    pub fn step<IO, C>(&mut self, sim: &Simulator, state: &mut MachineState, io: &mut IO, console: &mut C) -> Result<(), SimFault>
        where IO: IODevice + ?Sized, C: IODevice + ?Sized
    {
        if state.halted { return Ok(()) };

        if self.should_pause(state) {
            if self.breakpoints.contains(state.pc) {
                log::debug!("hit breakpoint at {}", state.pc);
            }
            match self.pause(state, console) {
                Resume::Step     => self.stepping = true,
                Resume::Continue => self.stepping = false,
            }
        }

        sim.step(state, io)
    }

    /// Executes the program until it halts, pausing as needed.
    pub fn run<IO, C>(&mut self, sim: &Simulator, state: &mut MachineState, io: &mut IO, console: &mut C) -> Result<(), SimFault>
        where IO: IODevice + ?Sized, C: IODevice + ?Sized
    {
        while !state.halted {
            self.step(sim, state, io, console)?;
        }
        Ok(())
    }

    /// Reads commands until one of them resumes execution.
    fn pause<C: IODevice + ?Sized>(&mut self, state: &MachineState, console: &mut C) -> Resume {
        loop {
            console.write_str(PROMPT);
            let Some(line) = console.read_line() else {
                log::warn!("debugger console closed, continuing without pausing");
                self.breakpoints = Breakpoints::new();
                return Resume::Continue;
            };

            match line.parse::<DebugCommand>() {
                Ok(DebugCommand::Step)     => return Resume::Step,
                Ok(DebugCommand::Continue) => return Resume::Continue,
                Ok(DebugCommand::ListBreakpoints) => console.write_str(&self.list_breakpoints()),
                Ok(DebugCommand::ToggleBreakpoint(addr)) => {
                    let msg = match self.breakpoints.toggle(addr) {
                        Ok(true)  => format!("breakpoint set at {addr}\n"),
                        Ok(false) => format!("breakpoint removed at {addr}\n"),
                        Err(e)    => format!("{e}\n"),
                    };
                    console.write_str(&msg);
                },
                Ok(DebugCommand::Display) => console.write_str(&self.display(state)),
                Err(e) => {
                    log::debug!("rejected debugger command {line:?}: {e}");
                    console.write_str(&format!("{e}\n"));
                }
            }
        }
    }

    fn list_breakpoints(&self) -> String {
        if self.breakpoints.is_empty() {
            return String::from("no breakpoints\n");
        }

        let addrs: Vec<_> = self.breakpoints.iter().map(|a| a.to_string()).collect();
        format!("breakpoints: {}\n", addrs.join(", "))
    }

    /// Renders the machine state: the PC and current instruction,
    /// memory around the PC, the registers, and the stack.
    pub fn display(&self, state: &MachineState) -> String {
        let mut out = String::new();
        let pc = state.pc;

        match state.mem.read(pc) {
            Ok(word) => {
                let name = Opcode::from_word(word).map_or("???", Opcode::mnemonic);
                let _ = writeln!(out, "pc: {pc}  instr: {word} ({name})");
            },
            Err(_) => {
                let _ = writeln!(out, "pc: {pc}  instr: <out of memory>");
            }
        }

        let start = pc.saturating_sub(self.memory_window);
        let end = pc.saturating_add(self.memory_window).saturating_add(1);
        out.push_str("memory:\n");
        for (addr, word) in (start..).zip(state.mem.window(start..end)) {
            let marker = if addr == pc { ">" } else { " " };
            let _ = writeln!(out, "{marker}{addr:>6}: {word}");
        }

        let regs: Vec<_> = (0..NUM_REGS as u8)
            .filter_map(Reg::new)
            .map(|r| format!("{r}={}", state.reg_file[r]))
            .collect();
        let _ = writeln!(out, "registers: {}", regs.join(" "));
        let _ = writeln!(out, "stack ({}): {:?}", state.stack.len(), state.stack);

        out
    }
}
impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}

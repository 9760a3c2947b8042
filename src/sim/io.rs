//! IO handling for the simulator.
//!
//! The machine only ever sees a line-oriented input source and a byte sink.
//! The interface for those is defined with the [`IODevice`] trait.
//!
//! Besides the trait, this module also includes:
//! - [`EmptyIO`]: An `IODevice` with no input and discarded output.
//! - [`BufferedIO`]: An `IODevice` over in-memory buffers.
//! - [`ChannelIO`]: An `IODevice` that reads lines from and writes bytes to channels.
//! - [`StdIO`]: An `IODevice` over stdin and stdout.
//! - [`InputLine`]: Recognition of the reserved `save` commands in program input.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

use crossbeam_channel as cbc;

/// Usage message printed when a `save` command is malformed.
pub const SAVE_USAGE: &str = "usage: save <path>\n";

/// A source of input lines and a sink for output bytes.
pub trait IODevice {
    /// Blocks until a full line of input is available, and returns it without its line terminator.
    ///
    /// This returns `None` if no more input will arrive.
    fn read_line(&mut self) -> Option<String>;

    /// Writes a byte to the output.
    fn write_byte(&mut self, byte: u8);

    /// Writes a string to the output.
    fn write_str(&mut self, s: &str) {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
    }
}
impl dyn IODevice {} // assert IODevice is dyn safe

impl<D: IODevice + ?Sized> IODevice for &mut D {
    fn read_line(&mut self) -> Option<String> {
        (**self).read_line()
    }

    fn write_byte(&mut self, byte: u8) {
        (**self).write_byte(byte)
    }

    fn write_str(&mut self, s: &str) {
        (**self).write_str(s)
    }
}

/// No IO. Input is always closed and all output is discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyIO;
impl IODevice for EmptyIO {
    fn read_line(&mut self) -> Option<String> {
        None
    }

    fn write_byte(&mut self, _byte: u8) {}
}

/// IO over in-memory buffers.
///
/// Input lines are queued up front (or with [`BufferedIO::push_line`]),
/// and output accumulates until it is taken.
#[derive(Debug, Clone, Default)]
pub struct BufferedIO {
    input: VecDeque<String>,
    output: Vec<u8>,
}
impl BufferedIO {
    /// Creates a buffered IO with the given pending input lines.
    pub fn new<S: Into<String>>(lines: impl IntoIterator<Item = S>) -> Self {
        Self {
            input: lines.into_iter().map(Into::into).collect(),
            output: vec![],
        }
    }

    /// Adds a line to the end of the pending input.
    pub fn push_line(&mut self, line: impl Into<String>) {
        self.input.push_back(line.into());
    }
    /// The number of input lines not yet read.
    pub fn pending_lines(&self) -> usize {
        self.input.len()
    }

    /// The output written so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }
    /// The output written so far, as a string.
    pub fn output_str(&self) -> std::borrow::Cow<str> {
        String::from_utf8_lossy(&self.output)
    }
    /// Takes the output written so far, clearing it.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }
}
impl IODevice for BufferedIO {
    fn read_line(&mut self) -> Option<String> {
        self.input.pop_front()
    }

    fn write_byte(&mut self, byte: u8) {
        self.output.push(byte);
    }
}

/// An IO that reads lines from one channel and writes bytes to another.
///
/// This lets a host feed input and drain output from other code
/// (or another thread) while the machine runs.
#[derive(Debug, Clone)]
pub struct ChannelIO {
    lines:  cbc::Receiver<String>,
    output: cbc::Sender<u8>,
}
impl ChannelIO {
    /// Creates a new channel IO with the given line receiver and output sender.
    pub fn new(lines: cbc::Receiver<String>, output: cbc::Sender<u8>) -> Self {
        Self { lines, output }
    }

    /// Creates a channel IO with unbounded channels,
    /// returning the IO along with the host's ends of the channels.
    pub fn unbounded() -> (Self, cbc::Sender<String>, cbc::Receiver<u8>) {
        let (line_tx, line_rx) = cbc::unbounded();
        let (out_tx, out_rx) = cbc::unbounded();

        (Self::new(line_rx, out_tx), line_tx, out_rx)
    }
}
impl IODevice for ChannelIO {
    fn read_line(&mut self) -> Option<String> {
        // Disconnected means no more input will come.
        self.lines.recv().ok()
    }

    fn write_byte(&mut self, byte: u8) {
        // If the receiving end hung up, nobody is listening. Drop the output.
        if self.output.send(byte).is_err() {
            log::trace!("output channel disconnected, dropping byte {byte}");
        }
    }
}

/// IO over stdin and stdout.
///
/// Output is flushed after every write, so prompts without
/// trailing newlines appear immediately.
#[derive(Debug, Default)]
pub struct StdIO;
impl IODevice for StdIO {
    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => {
                let trimmed = line.trim_end_matches(['\n', '\r']).len();
                line.truncate(trimmed);
                Some(line)
            },
            Err(e) => {
                log::warn!("could not read from stdin: {e}");
                None
            }
        }
    }

    fn write_byte(&mut self, byte: u8) {
        self.write_bytes(&[byte]);
    }

    fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }
}
impl StdIO {
    fn write_bytes(&mut self, bytes: &[u8]) {
        let mut stdout = io::stdout().lock();
        if let Err(e) = stdout.write_all(bytes).and_then(|_| stdout.flush()) {
            log::warn!("could not write to stdout: {e}");
        }
    }
}

/// A line of program input, classified by whether it is a reserved command.
///
/// Reserved commands are intercepted before they reach the running program.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum InputLine<'a> {
    /// `save <path>`: write a snapshot of the machine to the given path.
    Save(&'a str),
    /// `save` with the wrong number of arguments.
    SaveUsage,
    /// Anything else, which is passed to the program as is.
    Text(&'a str),
}
impl<'a> InputLine<'a> {
    /// Classifies a line of input.
    pub fn parse(line: &'a str) -> Self {
        let mut words = line.split_whitespace();
        if words.next() != Some("save") {
            return InputLine::Text(line);
        }

        match (words.next(), words.next()) {
            (Some(path), None) => InputLine::Save(path),
            _ => InputLine::SaveUsage,
        }
    }
}

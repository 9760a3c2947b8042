//! Saving and restoring machine states.
//!
//! A snapshot is an explicit little-endian encoding of the parts of a [`MachineState`]
//! that execution depends on:
//!
//! | field     | encoding                              |
//! |-----------|---------------------------------------|
//! | magic     | the bytes `SYNS`                      |
//! | version   | `u16`, currently [`VERSION`]          |
//! | pc        | `u16`                                 |
//! | halted    | `u8`, 0 or 1                          |
//! | registers | 8 × `u16`                             |
//! | memory    | 32768 × `u16`                         |
//! | stack     | `u32` length, then that many `u16`s   |
//! | input     | `u32` length, then that many `u16`s   |
//!
//! Snapshots are only guaranteed to load with the version that wrote them.

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::ast::{MAX_LITERAL, MEM_SIZE, NUM_REGS};

use super::mem::RegFile;
use super::MachineState;

/// The bytes every snapshot starts with.
pub const MAGIC: [u8; 4] = *b"SYNS";
/// The snapshot format version written by this crate.
pub const VERSION: u16 = 2;

/// Errors from reading or writing snapshots.
#[derive(Debug)]
pub enum SnapshotErr {
    /// The underlying reader or writer failed.
    Io(io::Error),
    /// The data does not start with [`MAGIC`].
    BadMagic,
    /// The snapshot was written with a different format version.
    UnsupportedVersion(u16),
    /// The data ended before the snapshot did.
    Truncated,
    /// There is data after the end of the snapshot.
    TrailingData,
    /// A field holds a value no machine state can have.
    InvalidField(&'static str),
}
impl std::fmt::Display for SnapshotErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotErr::Io(e)                 => std::fmt::Display::fmt(e, f),
            SnapshotErr::BadMagic              => f.write_str("not a snapshot file"),
            SnapshotErr::UnsupportedVersion(v) => write!(f, "unsupported snapshot version {v}"),
            SnapshotErr::Truncated             => f.write_str("snapshot is truncated"),
            SnapshotErr::TrailingData          => f.write_str("snapshot has trailing data"),
            SnapshotErr::InvalidField(name)    => write!(f, "snapshot has an invalid {name}"),
        }
    }
}
impl std::error::Error for SnapshotErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnapshotErr::Io(e) => Some(e),
            _ => None,
        }
    }
}
impl crate::err::Error for SnapshotErr {
    fn help(&self) -> Option<Cow<str>> {
        match self {
            SnapshotErr::Io(_) => None,
            SnapshotErr::BadMagic => Some("snapshots are created with the `save <path>` input command".into()),
            SnapshotErr::UnsupportedVersion(_) => Some(format!("this build reads version {VERSION} snapshots").into()),
            SnapshotErr::Truncated
            | SnapshotErr::TrailingData
            | SnapshotErr::InvalidField(_) => Some("the file may be corrupted".into()),
        }
    }
}
impl From<io::Error> for SnapshotErr {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::UnexpectedEof => SnapshotErr::Truncated,
            _ => SnapshotErr::Io(value),
        }
    }
}

/// Encodes a machine state into the given writer.
pub fn write<W: Write>(mut w: W, state: &MachineState) -> io::Result<()> {
    w.write_all(&MAGIC)?;
    w.write_u16::<LittleEndian>(VERSION)?;
    w.write_u16::<LittleEndian>(state.pc)?;
    w.write_u8(u8::from(state.halted))?;
    for &r in state.reg_file.as_array() {
        w.write_u16::<LittleEndian>(r)?;
    }
    for &m in state.mem.iter() {
        w.write_u16::<LittleEndian>(m)?;
    }

    w.write_u32::<LittleEndian>(encode_len(state.stack.len())?)?;
    for &s in &state.stack {
        w.write_u16::<LittleEndian>(s)?;
    }

    w.write_u32::<LittleEndian>(encode_len(state.input.len())?)?;
    for &c in &state.input {
        w.write_u16::<LittleEndian>(c)?;
    }

    w.flush()
}

fn encode_len(len: usize) -> io::Result<u32> {
    u32::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "sequence is too long for a snapshot"))
}

/// Decodes a machine state from the given reader.
///
/// The reader must end exactly where the snapshot ends.
pub fn read<R: Read>(mut r: R) -> Result<MachineState, SnapshotErr> {
    let mut magic = [0; 4];
    r.read_exact(&mut magic)?;
    if magic != MAGIC { return Err(SnapshotErr::BadMagic) };

    let version = r.read_u16::<LittleEndian>()?;
    if version != VERSION { return Err(SnapshotErr::UnsupportedVersion(version)) };

    let mut state = MachineState::new();
    state.pc = r.read_u16::<LittleEndian>()?;
    state.halted = match r.read_u8()? {
        0 => false,
        1 => true,
        _ => return Err(SnapshotErr::InvalidField("halted flag")),
    };

    let mut regs = [0; NUM_REGS];
    r.read_u16_into::<LittleEndian>(&mut regs)?;
    state.reg_file = RegFile::from_array(regs);

    let mut mem = vec![0; MEM_SIZE];
    r.read_u16_into::<LittleEndian>(&mut mem)?;
    state.mem.copy_block(0, &mem)
        .unwrap_or_else(|_| unreachable!("memory should hold exactly {MEM_SIZE} words"));

    // Read sequences incrementally, so a corrupt length cannot force a huge allocation.
    let stack_len = r.read_u32::<LittleEndian>()?;
    state.stack = (0..stack_len)
        .map(|_| r.read_u16::<LittleEndian>())
        .collect::<io::Result<_>>()?;

    let input_len = r.read_u32::<LittleEndian>()?;
    state.input = (0..input_len)
        .map(|_| r.read_u16::<LittleEndian>())
        .collect::<io::Result<_>>()?;
    if state.input.iter().any(|&c| c > MAX_LITERAL) {
        return Err(SnapshotErr::InvalidField("input character"));
    }

    if r.read(&mut [0])? != 0 { return Err(SnapshotErr::TrailingData) };

    Ok(state)
}

/// Encodes a machine state into bytes.
pub fn save(state: &MachineState) -> Vec<u8> {
    let mut bytes = vec![];
    write(&mut bytes, state)
        .unwrap_or_else(|e| unreachable!("writing a snapshot to memory should not fail: {e}"));
    bytes
}

/// Decodes a machine state from bytes.
pub fn load(mut bytes: &[u8]) -> Result<MachineState, SnapshotErr> {
    read(&mut bytes)
}

/// Writes a snapshot of a machine state to a file, replacing the file if it exists.
///
/// The snapshot is first written to a sibling file ending in `.tmp`,
/// which is then renamed over `path`. If writing fails, any existing file at `path` is kept.
pub fn write_file(path: impl AsRef<Path>, state: &MachineState) -> Result<(), SnapshotErr> {
    let path = path.as_ref();
    let tmp = temp_path(path)?;

    let result = File::create(&tmp)
        .and_then(|file| {
            let mut w = BufWriter::new(file);
            write(&mut w, state)?;
            w.get_ref().sync_all()
        })
        .and_then(|_| std::fs::rename(&tmp, path));

    if result.is_err() {
        // only clean up a file this call could have created
        if tmp.is_file() {
            let _ = std::fs::remove_file(&tmp);
        }
    }
    Ok(result?)
}

fn temp_path(path: &Path) -> io::Result<PathBuf> {
    let mut name = path.file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "snapshot path does not name a file"))?
        .to_os_string();
    name.push(".tmp");
    Ok(path.with_file_name(name))
}

/// Reads a machine state from a snapshot file.
pub fn read_file(path: impl AsRef<Path>) -> Result<MachineState, SnapshotErr> {
    let bytes = std::fs::read(path)?;
    load(&bytes)
}

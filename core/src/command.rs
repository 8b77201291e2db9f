//! Command payloads: one opcode byte followed by opcode-specific fields.
//!
//! | Opcode | Command  | Fields                                 |
//! |--------|----------|----------------------------------------|
//! | 1      | OPEN     | `path: str`                            |
//! | 2      | CLOSE    |                                        |
//! | 3      | PREPARE  | `sql: str`                             |
//! | 4      | BIND     | `handle: u64, index: u32, value`       |
//! | 5      | STEP     | `handle: u64`                          |
//! | 6      | FINALIZE | `handle: u64`                          |
//! | 7      | EXEC     | `sql: str`                             |
//!
//! `str` is a `u32` byte length followed by UTF-8. Bind indexes are
//! zero-based. Column values are returned inside the STEP reply, so there
//! is no separate column opcode. End of the command stream is signalled by
//! closing the channel, not by an opcode.

use std::fmt;

use crate::error::{DecodeError, Result};
use crate::value::Value;
use crate::wire::{PayloadReader, PayloadWriter};

/// Numeric identifier of a prepared statement.
pub type HandleId = u64;

/// Command discriminator, the first byte of every command payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Open = 1,
    Close = 2,
    Prepare = 3,
    Bind = 4,
    Step = 5,
    Finalize = 6,
    Exec = 7,
}

impl Opcode {
    /// All opcodes in wire order.
    pub const ALL: [Opcode; 7] = [
        Opcode::Open,
        Opcode::Close,
        Opcode::Prepare,
        Opcode::Bind,
        Opcode::Step,
        Opcode::Finalize,
        Opcode::Exec,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Opcode::Open => "OPEN",
            Opcode::Close => "CLOSE",
            Opcode::Prepare => "PREPARE",
            Opcode::Bind => "BIND",
            Opcode::Step => "STEP",
            Opcode::Finalize => "FINALIZE",
            Opcode::Exec => "EXEC",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = DecodeError;

    fn try_from(byte: u8) -> Result<Self> {
        Opcode::ALL
            .into_iter()
            .find(|op| *op as u8 == byte)
            .ok_or(DecodeError::UnknownOpcode(byte))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded command.
///
/// # Examples
///
/// ```
/// use sqinn_core::{Command, Value};
///
/// let cmd = Command::Bind { handle: 1, index: 0, value: Value::from("a") };
/// let payload = cmd.to_bytes();
/// assert_eq!(Command::decode(&payload).unwrap(), cmd);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Open { path: String },
    Close,
    Prepare { sql: String },
    Bind { handle: HandleId, index: u32, value: Value },
    Step { handle: HandleId },
    Finalize { handle: HandleId },
    Exec { sql: String },
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::Open { .. } => Opcode::Open,
            Command::Close => Opcode::Close,
            Command::Prepare { .. } => Opcode::Prepare,
            Command::Bind { .. } => Opcode::Bind,
            Command::Step { .. } => Opcode::Step,
            Command::Finalize { .. } => Opcode::Finalize,
            Command::Exec { .. } => Opcode::Exec,
        }
    }

    /// Decodes a complete command payload.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] for an unknown opcode, a malformed or
    /// truncated field, or bytes left over after the last field.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(payload);
        let opcode = Opcode::try_from(r.u8()?)?;
        let command = match opcode {
            Opcode::Open => Command::Open {
                path: r.str("path")?.to_owned(),
            },
            Opcode::Close => Command::Close,
            Opcode::Prepare => Command::Prepare {
                sql: r.str("sql")?.to_owned(),
            },
            Opcode::Bind => Command::Bind {
                handle: r.u64()?,
                index: r.u32()?,
                value: Value::decode(&mut r)?,
            },
            Opcode::Step => Command::Step { handle: r.u64()? },
            Opcode::Finalize => Command::Finalize { handle: r.u64()? },
            Opcode::Exec => Command::Exec {
                sql: r.str("sql")?.to_owned(),
            },
        };
        r.finish()?;
        Ok(command)
    }

    /// Encodes the command payload (without the frame prefix).
    pub fn encode(&self, w: &mut PayloadWriter) {
        w.put_u8(self.opcode() as u8);
        match self {
            Command::Open { path } => w.put_str(path),
            Command::Close => {}
            Command::Prepare { sql } | Command::Exec { sql } => w.put_str(sql),
            Command::Bind {
                handle,
                index,
                value,
            } => {
                w.put_u64(*handle);
                w.put_u32(*index);
                value.encode(w);
            }
            Command::Step { handle } | Command::Finalize { handle } => w.put_u64(*handle),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = PayloadWriter::new();
        self.encode(&mut w);
        w.into_bytes()
    }
}

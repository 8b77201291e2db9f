//! Reply payloads: one status byte followed by status-specific fields.
//!
//! On error (status != 0) the fields are a `u32` message length and the
//! UTF-8 message. On success the fields depend on the command:
//!
//! | Command  | Success body                                         |
//! |----------|------------------------------------------------------|
//! | OPEN     | (none)                                               |
//! | CLOSE    | (none)                                               |
//! | PREPARE  | `handle: u64, params: u32, columns: u32`             |
//! | BIND     | (none)                                               |
//! | STEP     | `1, ncols: u32, value * ncols` or `0`                |
//! | FINALIZE | (none)                                               |
//! | EXEC     | `changes: i64`                                       |
//!
//! Success bodies are not self-describing, so decoding a reply needs the
//! [`Opcode`] of the command it answers. Replies arrive in command order,
//! which gives the host that context for free.

use std::fmt;

use crate::command::{HandleId, Opcode};
use crate::error::{DecodeError, Result};
use crate::value::Value;
use crate::wire::{PayloadReader, PayloadWriter};

/// Reply status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    /// Malformed command payload or value.
    Decode = 1,
    /// Handle identifier is unknown or already finalized.
    UnknownHandle = 2,
    /// Bind index out of range or bind rejected by the engine.
    Bind = 3,
    /// Column index out of range.
    ColumnRange = 4,
    /// The SQL engine rejected the operation.
    Engine = 5,
    /// Connection state misuse (not open, already open).
    State = 6,
}

impl Status {
    pub const ALL: [Status; 7] = [
        Status::Ok,
        Status::Decode,
        Status::UnknownHandle,
        Status::Bind,
        Status::ColumnRange,
        Status::Engine,
        Status::State,
    ];

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Decode => "decode error",
            Status::UnknownHandle => "unknown handle",
            Status::Bind => "bind error",
            Status::ColumnRange => "column range error",
            Status::Engine => "engine error",
            Status::State => "state error",
        }
    }
}

impl TryFrom<u8> for Status {
    type Error = DecodeError;

    fn try_from(byte: u8) -> Result<Self> {
        Status::ALL
            .into_iter()
            .find(|s| *s as u8 == byte)
            .ok_or(DecodeError::UnknownStatus(byte))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reply to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Success with no body (OPEN, CLOSE, BIND, FINALIZE).
    Ack,
    /// PREPARE succeeded.
    Prepared {
        handle: HandleId,
        param_count: u32,
        column_count: u32,
    },
    /// STEP produced a row.
    Row(Vec<Value>),
    /// STEP reached the end of the result set.
    NoRow,
    /// EXEC finished; number of rows changed.
    Executed { changes: i64 },
    /// Any failure, reported in-band.
    Error { status: Status, message: String },
}

impl Reply {
    pub fn error(status: Status, message: impl Into<String>) -> Self {
        Reply::Error {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Reply::Error { status, .. } => *status,
            _ => Status::Ok,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status().is_ok()
    }

    /// Encodes the reply payload (without the frame prefix).
    pub fn encode(&self, w: &mut PayloadWriter) {
        w.put_u8(self.status() as u8);
        match self {
            Reply::Ack => {}
            Reply::Prepared {
                handle,
                param_count,
                column_count,
            } => {
                w.put_u64(*handle);
                w.put_u32(*param_count);
                w.put_u32(*column_count);
            }
            Reply::Row(values) => {
                w.put_u8(1);
                w.put_u32(u32::try_from(values.len()).unwrap_or(u32::MAX));
                for value in values {
                    value.encode(w);
                }
            }
            Reply::NoRow => w.put_u8(0),
            Reply::Executed { changes } => w.put_i64(*changes),
            Reply::Error { message, .. } => w.put_str(message),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = PayloadWriter::new();
        self.encode(&mut w);
        w.into_bytes()
    }

    /// Decodes the reply to a command with the given opcode.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqinn_core::{Opcode, Reply, Value};
    ///
    /// let reply = Reply::Row(vec![Value::Integer(1)]);
    /// let decoded = Reply::decode(Opcode::Step, &reply.to_bytes()).unwrap();
    /// assert_eq!(decoded, reply);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] for an unknown status, a malformed body, or
    /// trailing bytes.
    pub fn decode(opcode: Opcode, payload: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(payload);
        let status = Status::try_from(r.u8()?)?;
        let reply = if status.is_ok() {
            match opcode {
                Opcode::Open | Opcode::Close | Opcode::Bind | Opcode::Finalize => Reply::Ack,
                Opcode::Prepare => Reply::Prepared {
                    handle: r.u64()?,
                    param_count: r.u32()?,
                    column_count: r.u32()?,
                },
                Opcode::Step => match r.u8()? {
                    0 => Reply::NoRow,
                    _ => {
                        let count = r.u32()?;
                        // each value takes at least one byte
                        let mut values = Vec::with_capacity((count as usize).min(r.remaining()));
                        for _ in 0..count {
                            values.push(Value::decode(&mut r)?);
                        }
                        Reply::Row(values)
                    }
                },
                Opcode::Exec => Reply::Executed { changes: r.i64()? },
            }
        } else {
            Reply::Error {
                status,
                message: r.str("message")?.to_owned(),
            }
        };
        r.finish()?;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_bytes_are_stable() {
        let bytes: Vec<u8> = Status::ALL.iter().map(|s| *s as u8).collect();
        assert_eq!(bytes, vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(Status::try_from(7).unwrap_err(), DecodeError::UnknownStatus(7));
    }

    #[test]
    fn test_error_layout() {
        let reply = Reply::error(Status::UnknownHandle, "no");
        assert_eq!(reply.to_bytes(), vec![2, 0, 0, 0, 2, b'n', b'o']);
    }

    #[test]
    fn test_no_row_layout() {
        assert_eq!(Reply::NoRow.to_bytes(), vec![0, 0]);
    }

    #[test]
    fn test_row_layout() {
        let reply = Reply::Row(vec![Value::Null, Value::Integer(1)]);
        assert_eq!(
            reply.to_bytes(),
            vec![0, 1, 0, 0, 0, 2, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1]
        );
    }

    #[test]
    fn test_decode_depends_on_opcode() {
        let payload = Reply::Executed { changes: 3 }.to_bytes();
        assert_eq!(
            Reply::decode(Opcode::Exec, &payload).unwrap(),
            Reply::Executed { changes: 3 }
        );
        // the same bytes are not a valid OPEN reply
        assert!(matches!(
            Reply::decode(Opcode::Open, &payload),
            Err(DecodeError::TrailingBytes(8))
        ));
    }

    #[test]
    fn test_error_decodes_for_any_opcode() {
        let payload = Reply::error(Status::Engine, "syntax error").to_bytes();
        for op in Opcode::ALL {
            let reply = Reply::decode(op, &payload).unwrap();
            assert_eq!(reply.status(), Status::Engine);
        }
    }
}

//! Error types for command execution and the serving loop.
//!
//! [`CommandError`] covers everything that rejects a single command and is
//! reported in-band as an error reply. [`DriverError`] covers the conditions
//! that end the serving loop.

use sqinn_core::{DecodeError, FrameError, HandleId, Status};
use thiserror::Error;

/// `SQLITE_CORRUPT` primary result code.
pub const SQLITE_CORRUPT: i32 = 11;

/// Failure reported by the SQLite engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sqlite error {code}: {message}")]
pub struct EngineError {
    /// Extended SQLite result code.
    pub code: i32,
    /// Engine message (from `sqlite3_errmsg` when available).
    pub message: String,
}

impl EngineError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Primary result code (low byte of the extended code).
    pub fn primary_code(&self) -> i32 {
        self.code & 0xff
    }

    /// Whether the engine reported database corruption.
    pub fn is_corruption(&self) -> bool {
        self.primary_code() == SQLITE_CORRUPT
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(failure, message) => Self {
                code: failure.extended_code,
                message: message.unwrap_or_else(|| failure.to_string()),
            },
            other => Self::new(rusqlite::ffi::SQLITE_ERROR, other.to_string()),
        }
    }
}

/// Errors that reject one command. Each maps to exactly one reply [`Status`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The command payload or a value inside it was malformed.
    #[error("{0}")]
    Decode(#[from] DecodeError),

    /// The handle was never allocated, or was already finalized.
    #[error("unknown statement handle {0}")]
    UnknownHandle(HandleId),

    /// The bind index was outside the statement's parameter range, or the
    /// engine refused the value.
    #[error("{0}")]
    Bind(String),

    /// A column was requested outside the current row.
    #[error("column index {index} out of range (statement has {count} columns)")]
    ColumnRange { index: usize, count: usize },

    /// The SQL engine rejected the operation.
    #[error("{}", .0.message)]
    Engine(#[from] EngineError),

    /// Connection state misuse.
    #[error("{0}")]
    State(String),
}

impl CommandError {
    /// Reply status reported for this error.
    pub fn status(&self) -> Status {
        match self {
            CommandError::Decode(_) => Status::Decode,
            CommandError::UnknownHandle(_) => Status::UnknownHandle,
            CommandError::Bind(_) => Status::Bind,
            CommandError::ColumnRange { .. } => Status::ColumnRange,
            CommandError::Engine(_) => Status::Engine,
            CommandError::State(_) => Status::State,
        }
    }

    pub(crate) fn not_open() -> Self {
        CommandError::State("no open database connection".to_string())
    }
}

/// Conditions that end the serving loop.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The command or reply stream broke framing.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// The engine reported corruption; no further commands are accepted.
    #[error("database corrupted: {0}")]
    Corrupt(EngineError),
}

/// Convenience alias for results with [`CommandError`].
pub type Result<T> = std::result::Result<T, CommandError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(CommandError::UnknownHandle(1).status(), Status::UnknownHandle);
        assert_eq!(CommandError::not_open().status(), Status::State);
        assert_eq!(
            CommandError::from(DecodeError::UnknownTag(9)).status(),
            Status::Decode
        );
        assert_eq!(
            CommandError::ColumnRange { index: 3, count: 1 }.status(),
            Status::ColumnRange
        );
    }

    #[test]
    fn test_engine_message_is_reported_verbatim() {
        let err = CommandError::from(EngineError::new(1, "near \"SELEC\": syntax error"));
        assert_eq!(err.to_string(), "near \"SELEC\": syntax error");
        assert_eq!(err.status(), Status::Engine);
    }

    #[test]
    fn test_corruption_uses_primary_code() {
        // SQLITE_CORRUPT_VTAB = SQLITE_CORRUPT | (1 << 8)
        assert!(EngineError::new(SQLITE_CORRUPT | (1 << 8), "vtab").is_corruption());
        assert!(!EngineError::new(19, "constraint").is_corruption());
    }
}

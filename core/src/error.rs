//! Error types for the sqinn wire protocol.
//!
//! Two failure classes are kept apart. [`FrameError`] means the byte stream itself can no longer be trusted and
//! the serving loop must stop, while [`DecodeError`] means a single,
//! well-framed payload was malformed and only that command is rejected.

use thiserror::Error;

/// Errors raised while reading or writing length-prefixed frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The stream ended after part of a frame had been read.
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Number of bytes the frame section declared or required.
        expected: usize,
        /// Number of bytes actually available before end of stream.
        actual: usize,
    },

    /// A frame declared a zero-length payload.
    #[error("empty frame: declared payload length is zero")]
    EmptyFrame,

    /// A frame declared (or a caller supplied) a payload above the limit.
    #[error("frame too large: {len} bytes exceeds limit of {max} bytes")]
    TooLarge {
        /// Declared or supplied payload length.
        len: u64,
        /// Maximum accepted payload length.
        max: u64,
    },

    /// Underlying channel failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while decoding the contents of a single payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The payload ended before a field was complete.
    #[error("unexpected end of payload: needed {needed} more bytes at offset {offset}")]
    UnexpectedEnd {
        /// Offset at which the read started.
        offset: usize,
        /// Number of bytes that were missing.
        needed: usize,
    },

    /// A value tag byte is not part of the value model.
    #[error("unknown value tag: {0}")]
    UnknownTag(u8),

    /// A command opcode byte is not part of the command set.
    #[error("unknown opcode: {0}")]
    UnknownOpcode(u8),

    /// A reply status byte is not part of the status set.
    #[error("unknown status: {0}")]
    UnknownStatus(u8),

    /// The payload carried bytes past the last expected field.
    #[error("{0} trailing bytes after command arguments")]
    TrailingBytes(usize),

    /// A string field (SQL text, path, error message) was not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),
}

/// Convenience alias for results with [`DecodeError`].
pub type Result<T> = std::result::Result<T, DecodeError>;

//! Wire protocol for sqinn, SQLite over a pair of byte pipes.
//!
//! This crate has no knowledge of SQL. It defines the bytes that travel
//! between a host process and the `sqinn` server:
//!
//! - [`read_frame`] / [`write_frame`]: length-prefixed framing.
//! - [`Value`]: the tagged value model (null, integer, real, text, blob).
//! - [`Command`] / [`Opcode`]: command payloads sent by the host.
//! - [`Reply`] / [`Status`]: reply payloads sent back by the server.
//! - [`PayloadReader`] / [`PayloadWriter`]: bounds-checked field access.
//!
//! Framing failures ([`FrameError`]) are fatal to a session; payload
//! failures ([`DecodeError`]) only reject one command.
//!
//! # Example
//!
//! ```
//! use sqinn_core::*;
//!
//! // Host side: send a PREPARE command
//! let mut wire = Vec::new();
//! let cmd = Command::Prepare { sql: "SELECT 1".into() };
//! write_frame(&mut wire, &cmd.to_bytes()).unwrap();
//!
//! // Server side: read it back
//! let payload = read_frame(&mut wire.as_slice(), DEFAULT_MAX_FRAME_LEN)
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(Command::decode(&payload).unwrap(), cmd);
//! ```

mod command;
mod error;
mod frame;
mod reply;
mod value;
mod wire;

pub use command::{Command, HandleId, Opcode};
pub use error::{DecodeError, FrameError, Result};
pub use frame::{DEFAULT_MAX_FRAME_LEN, LENGTH_PREFIX_LEN, read_frame, write_frame};
pub use reply::{Reply, Status};
pub use value::{TAG_BLOB, TAG_INTEGER, TAG_NULL, TAG_REAL, TAG_TEXT, Value};
pub use wire::{PayloadReader, PayloadWriter};

//! SQLite command processing for sqinn.
//!
//! This crate turns the byte-level protocol of [`sqinn_core`] into SQLite
//! operations. It holds the one database connection, the prepared
//! statements opened by the host, and the loop that serves them.
//!
//! # Architecture
//!
//! The crate is organized into four modules:
//!
//! - **`engine`**: thin adapter over SQLite (connection, statements,
//!   binding, stepping, column values)
//! - **`handles`**: the handle table: numeric identifiers for live
//!   statements and their cursor state
//! - **`interpreter`**: the protocol state machine, one command in, one
//!   reply out
//! - **`driver`**: the blocking read/dispatch/write loop
//!
//! # Quick start
//!
//! ```no_run
//! use sqinn_sqlite::{serve, DriverOptions, Interpreter};
//!
//! let mut interp = Interpreter::open("app.db").unwrap();
//! let stdin = std::io::stdin();
//! let stdout = std::io::stdout();
//! serve(&mut interp, &mut stdin.lock(), &mut stdout.lock(), &DriverOptions::default()).unwrap();
//! interp.shutdown().unwrap();
//! ```
//!
//! # Error policy
//!
//! Malformed commands, unknown handles, bind and column range errors and
//! engine failures are all answered with an error reply; the loop keeps
//! going. Only a framing failure or database corruption ends it, as a
//! [`DriverError`].

mod driver;
mod engine;
mod error;
mod handles;
mod interpreter;

pub use driver::{DriverOptions, DriverSummary, serve};
pub use engine::{Database, MEMORY_PATH, Statement, StepResult, sqlite_version};
pub use error::{CommandError, DriverError, EngineError, Result, SQLITE_CORRUPT};
pub use handles::{HandleState, HandleStats, HandleTable, StatementHandle};
pub use interpreter::Interpreter;

//! The serving loop: one frame in, one frame out, until the stream ends.
//!
//! There is no concurrency. The loop blocks on the frame read, runs the
//! command to completion, writes and flushes the reply, and repeats. The
//! Nth reply always answers the Nth command.

use std::io::{Read, Write};

use sqinn_core::{DEFAULT_MAX_FRAME_LEN, read_frame, write_frame};
use tracing::{debug, info};

use crate::error::DriverError;
use crate::interpreter::Interpreter;

/// Tunables for [`serve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverOptions {
    /// Largest accepted command payload in bytes.
    pub max_frame_len: u32,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// What a completed serving loop processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverSummary {
    /// Commands answered.
    pub commands: u64,
    /// Commands answered with an error reply.
    pub errors: u64,
}

/// Serves commands from `reader` and writes replies to `writer` until the
/// command stream ends cleanly.
///
/// The interpreter is left as is when the loop returns; call
/// [`Interpreter::shutdown`] to finalize statements and close the database.
///
/// # Errors
///
/// - [`DriverError::Frame`] when a command frame is malformed or truncated,
///   or a reply cannot be written.
/// - [`DriverError::Corrupt`] after the engine reports corruption. The error
///   reply for that command has already been written.
///
/// # Examples
///
/// ```
/// use sqinn_core::{read_frame, write_frame, Command, Opcode, Reply, DEFAULT_MAX_FRAME_LEN};
/// use sqinn_sqlite::{serve, DriverOptions, Interpreter};
///
/// let mut input = Vec::new();
/// write_frame(&mut input, &Command::Exec { sql: "CREATE TABLE t (a)".into() }.to_bytes()).unwrap();
///
/// let mut interp = Interpreter::open(":memory:").unwrap();
/// let mut output = Vec::new();
/// let summary = serve(&mut interp, &mut input.as_slice(), &mut output, &DriverOptions::default()).unwrap();
/// assert_eq!(summary.commands, 1);
///
/// let payload = read_frame(&mut output.as_slice(), DEFAULT_MAX_FRAME_LEN).unwrap().unwrap();
/// assert_eq!(Reply::decode(Opcode::Exec, &payload).unwrap(), Reply::Executed { changes: 0 });
/// ```
pub fn serve<R, W>(
    interp: &mut Interpreter,
    reader: &mut R,
    writer: &mut W,
    options: &DriverOptions,
) -> Result<DriverSummary, DriverError>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut summary = DriverSummary::default();

    while let Some(payload) = read_frame(reader, options.max_frame_len)? {
        let reply = interp.dispatch(&payload);
        summary.commands += 1;
        if !reply.is_ok() {
            summary.errors += 1;
        }
        write_frame(writer, &reply.to_bytes())?;

        if let Some(err) = interp.take_fatal() {
            return Err(DriverError::Corrupt(err));
        }
    }

    debug!("command stream closed");
    info!(
        commands = summary.commands,
        errors = summary.errors,
        "serving loop finished"
    );
    Ok(summary)
}

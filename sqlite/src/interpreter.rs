//! Command interpreter: maps one decoded command to engine operations and
//! produces exactly one reply.
//!
//! Every failure below framing becomes an error [`Reply`]; nothing escapes
//! [`Interpreter::dispatch`]. The one condition the caller must act on is
//! database corruption, exposed through [`Interpreter::take_fatal`].

use sqinn_core::{Command, Reply};
use tracing::{debug, info, warn};

use crate::engine::Database;
use crate::error::{CommandError, EngineError, Result};
use crate::handles::{HandleStats, HandleTable};

/// Protocol state machine over one optional database connection.
///
/// # Examples
///
/// ```
/// use sqinn_core::{Command, Reply, Value};
/// use sqinn_sqlite::Interpreter;
///
/// let mut interp = Interpreter::open(":memory:").unwrap();
/// let reply = interp.execute(Command::Prepare { sql: "SELECT 1".into() });
/// let Reply::Prepared { handle, .. } = reply else { panic!("{reply:?}") };
///
/// let row = interp.execute(Command::Step { handle });
/// assert_eq!(row, Reply::Row(vec![Value::Integer(1)]));
/// assert_eq!(interp.execute(Command::Step { handle }), Reply::NoRow);
/// ```
#[derive(Debug, Default)]
pub struct Interpreter {
    // Field order matters: handles are dropped before the database.
    handles: HandleTable,
    db: Option<Database>,
    fatal: Option<EngineError>,
}

impl Interpreter {
    /// Creates an interpreter with no open connection; the host must send
    /// OPEN first.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an interpreter with a connection to `path` already open.
    pub fn open(path: &str) -> std::result::Result<Self, EngineError> {
        let db = Database::open(path)?;
        info!(path, "database opened");
        Ok(Self {
            db: Some(db),
            ..Self::default()
        })
    }

    pub fn is_open(&self) -> bool {
        self.db.is_some()
    }

    /// Path of the open database, if any.
    pub fn database_path(&self) -> Option<&str> {
        self.db.as_ref().map(Database::path)
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    pub fn handle_stats(&self) -> HandleStats {
        self.handles.stats()
    }

    /// Returns the corruption error that makes further commands unsafe, if
    /// one was reported since the last call.
    pub fn take_fatal(&mut self) -> Option<EngineError> {
        self.fatal.take()
    }

    /// Decodes and executes one command payload.
    pub fn dispatch(&mut self, payload: &[u8]) -> Reply {
        match Command::decode(payload) {
            Ok(command) => self.execute(command),
            Err(err) => {
                let opcode = payload.first().copied().unwrap_or_default();
                self.fail(&format!("opcode {opcode}"), err.into())
            }
        }
    }

    /// Executes one decoded command.
    pub fn execute(&mut self, command: Command) -> Reply {
        let opcode = command.opcode();
        debug!(%opcode, "dispatch");
        match self.run(command) {
            Ok(reply) => reply,
            Err(err) => self.fail(opcode.as_str(), err),
        }
    }

    fn fail(&mut self, what: &str, err: CommandError) -> Reply {
        debug!(command = what, status = %err.status(), error = %err, "command failed");
        if let CommandError::Engine(engine) = &err {
            if engine.is_corruption() {
                warn!(error = %engine, "database corruption reported");
                self.fatal = Some(engine.clone());
            }
        }
        Reply::error(err.status(), err.to_string())
    }

    fn run(&mut self, command: Command) -> Result<Reply> {
        match command {
            Command::Open { path } => {
                self.open_database(&path)?;
                Ok(Reply::Ack)
            }
            Command::Close => {
                self.close_database()?;
                Ok(Reply::Ack)
            }
            Command::Prepare { sql } => {
                let db = self.db.as_ref().ok_or_else(CommandError::not_open)?;
                let stmt = db.prepare(&sql)?;
                let id = self.handles.allocate(stmt);
                let handle = self.handles.resolve(id)?;
                debug!(handle = id, params = handle.parameter_count(), "statement prepared");
                Ok(Reply::Prepared {
                    handle: id,
                    param_count: to_u32(handle.parameter_count()),
                    column_count: to_u32(handle.column_count()),
                })
            }
            // Handle commands do not check the connection: after CLOSE the
            // table is empty and they report UnknownHandle.
            Command::Bind {
                handle,
                index,
                value,
            } => {
                let index = usize::try_from(index)
                    .map_err(|_| CommandError::Bind(format!("bind index {index} out of range")))?;
                self.handles.resolve(handle)?.bind(index, &value)?;
                Ok(Reply::Ack)
            }
            Command::Step { handle } => match self.handles.resolve(handle)?.step()? {
                Some(row) => Ok(Reply::Row(row)),
                None => Ok(Reply::NoRow),
            },
            Command::Finalize { handle } => {
                self.handles.release(handle)?;
                debug!(handle, "statement finalized");
                Ok(Reply::Ack)
            }
            Command::Exec { sql } => {
                let db = self.db.as_ref().ok_or_else(CommandError::not_open)?;
                let changes = db.exec(&sql)?;
                Ok(Reply::Executed { changes })
            }
        }
    }

    fn open_database(&mut self, path: &str) -> Result<()> {
        if let Some(db) = &self.db {
            return Err(CommandError::State(format!(
                "database already open: {}",
                db.path()
            )));
        }
        self.db = Some(Database::open(path)?);
        info!(path, "database opened");
        Ok(())
    }

    /// Finalizes every live handle, then closes the connection.
    fn close_database(&mut self) -> Result<()> {
        let db = self.db.take().ok_or_else(CommandError::not_open)?;
        let finalized = self.handles.release_all();
        let path = db.path().to_string();
        match db.close() {
            Ok(()) => {
                info!(path = %path, finalized, "database closed");
                Ok(())
            }
            Err((db, err)) => {
                self.db = Some(db);
                Err(err.into())
            }
        }
    }

    /// Releases every handle and closes the connection, if open. Used when
    /// the command stream ends.
    pub fn shutdown(&mut self) -> std::result::Result<HandleStats, EngineError> {
        if !self.handles.is_empty() {
            let finalized = self.handles.release_all();
            debug!(finalized, "finalized outstanding statements at shutdown");
        }
        if let Some(db) = self.db.take() {
            db.close().map_err(|(_, err)| err)?;
        }
        Ok(self.handles.stats())
    }
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqinn_core::{Opcode, Status, Value};

    fn prepare(interp: &mut Interpreter, sql: &str) -> u64 {
        match interp.execute(Command::Prepare { sql: sql.into() }) {
            Reply::Prepared { handle, .. } => handle,
            other => panic!("prepare failed: {other:?}"),
        }
    }

    #[test]
    fn test_commands_require_connection() {
        let mut interp = Interpreter::new();
        for cmd in [
            Command::Prepare {
                sql: "SELECT 1".into(),
            },
            Command::Exec {
                sql: "SELECT 1".into(),
            },
            Command::Close,
        ] {
            assert_eq!(interp.execute(cmd).status(), Status::State);
        }
        assert_eq!(
            interp.execute(Command::Step { handle: 1 }).status(),
            Status::UnknownHandle
        );
    }

    #[test]
    fn test_open_twice_is_state_error() {
        let mut interp = Interpreter::open(":memory:").unwrap();
        let reply = interp.execute(Command::Open {
            path: ":memory:".into(),
        });
        assert_eq!(reply.status(), Status::State);
        assert!(interp.is_open());
        assert_eq!(interp.database_path(), Some(":memory:"));
    }

    #[test]
    fn test_prepare_reports_counts() {
        let mut interp = Interpreter::open(":memory:").unwrap();
        let reply = interp.execute(Command::Prepare {
            sql: "SELECT ?, ?".into(),
        });
        assert_eq!(
            reply,
            Reply::Prepared {
                handle: 1,
                param_count: 2,
                column_count: 2
            }
        );
    }

    #[test]
    fn test_dispatch_reports_decode_errors() {
        let mut interp = Interpreter::open(":memory:").unwrap();
        let reply = interp.dispatch(&[0xee]);
        assert_eq!(reply.status(), Status::Decode);
        assert_eq!(
            interp.dispatch(&[Opcode::Step as u8, 0, 0]).status(),
            Status::Decode
        );
    }

    #[test]
    fn test_engine_error_message_is_forwarded() {
        let mut interp = Interpreter::open(":memory:").unwrap();
        let reply = interp.execute(Command::Exec {
            sql: "SELECT * FROM missing".into(),
        });
        match reply {
            Reply::Error { status, message } => {
                assert_eq!(status, Status::Engine);
                assert!(message.contains("no such table"), "{message}");
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert!(interp.take_fatal().is_none());
    }

    #[test]
    fn test_close_finalizes_handles() {
        let mut interp = Interpreter::open(":memory:").unwrap();
        prepare(&mut interp, "SELECT 1");
        prepare(&mut interp, "SELECT 2");
        assert_eq!(interp.handles().live(), 2);
        assert_eq!(interp.execute(Command::Close), Reply::Ack);
        assert!(!interp.is_open());
        assert!(interp.database_path().is_none());
        assert!(interp.handles().is_empty());
        assert!(interp.handle_stats().is_balanced());
    }

    #[test]
    fn test_bind_value_round_trips_through_engine() {
        let mut interp = Interpreter::open(":memory:").unwrap();
        let h = prepare(&mut interp, "SELECT ?");
        let value = Value::Blob(vec![9, 8, 7]);
        assert_eq!(
            interp.execute(Command::Bind {
                handle: h,
                index: 0,
                value: value.clone()
            }),
            Reply::Ack
        );
        assert_eq!(interp.execute(Command::Step { handle: h }), Reply::Row(vec![value]));
    }

    #[test]
    fn test_shutdown_closes_and_balances() {
        let mut interp = Interpreter::open(":memory:").unwrap();
        prepare(&mut interp, "SELECT 1");
        let stats = interp.shutdown().unwrap();
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.released, 1);
        assert!(!interp.is_open());
    }
}

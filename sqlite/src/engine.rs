//! Thin adapter over the SQLite engine.
//!
//! [`Database`] wraps a [`rusqlite::Connection`] for opening and closing.
//! Prepared statements need a cursor that stays positioned between
//! protocol commands, which `rusqlite::Statement` does not offer (its row
//! iterator resets the statement when dropped), so [`Statement`] drives
//! `sqlite3_stmt` through [`rusqlite::ffi`] directly. This file is the only
//! place in the crate that contains `unsafe` code.
//!
//! A [`Statement`] does not borrow its [`Database`]. The owner must drop
//! every statement before closing the database; the interpreter guarantees
//! this through the handle table.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::ptr;

use rusqlite::{Connection, ffi};
use sqinn_core::Value;

use crate::error::EngineError;

/// Path marker for an in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Version string of the linked SQLite library.
pub fn sqlite_version() -> &'static str {
    rusqlite::version()
}

/// Reads the current error message and extended code from a connection.
///
/// `fallback` is used as the code when the connection reports none.
fn last_error(db: *mut ffi::sqlite3, fallback: c_int) -> EngineError {
    // SAFETY: `db` is a live connection handle owned by a `Database`.
    unsafe {
        let code = match ffi::sqlite3_extended_errcode(db) {
            ffi::SQLITE_OK => fallback,
            code => code,
        };
        let msg = ffi::sqlite3_errmsg(db);
        let message = if msg.is_null() {
            format!("sqlite error {code}")
        } else {
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        };
        EngineError::new(code, message)
    }
}

/// Outcome of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// A result row is available.
    Row,
    /// The statement has finished executing.
    Done,
}

/// An open SQLite connection.
pub struct Database {
    conn: Connection,
    path: String,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

impl Database {
    /// Opens (or creates) the database at `path`. [`MEMORY_PATH`] opens a
    /// private in-memory database.
    pub fn open(path: &str) -> Result<Self, EngineError> {
        let conn = if path == MEMORY_PATH {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        Ok(Self {
            conn,
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Closes the connection. On failure the still-open database is handed
    /// back together with the error.
    pub fn close(self) -> Result<(), (Self, EngineError)> {
        let Database { conn, path } = self;
        conn.close()
            .map_err(move |(conn, err)| (Database { conn, path }, EngineError::from(err)))
    }

    pub(crate) fn raw(&self) -> *mut ffi::sqlite3 {
        // SAFETY: the handle stays valid for as long as `self.conn` lives
        // and is only used on this thread.
        unsafe { self.conn.handle() }
    }

    /// Total number of rows changed since the connection was opened.
    pub fn total_changes(&self) -> i64 {
        // SAFETY: live connection handle.
        unsafe { ffi::sqlite3_total_changes64(self.raw()) }
    }

    /// Compiles the first statement in `sql`.
    ///
    /// Returns the statement (or `None` when the text holds only whitespace,
    /// comments or an empty `;`) and the unconsumed tail of `sql`.
    fn prepare_next<'s>(&self, sql: &'s str) -> Result<(Option<Statement>, &'s str), EngineError> {
        let len = c_int::try_from(sql.len())
            .map_err(|_| EngineError::new(ffi::SQLITE_TOOBIG, "SQL text too long"))?;
        let db = self.raw();
        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        let mut tail: *const c_char = ptr::null();

        // SAFETY: `sql` is valid for `len` bytes; SQLite reads at most that
        // many and needs no NUL terminator when a length is given.
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(db, sql.as_ptr().cast::<c_char>(), len, &mut stmt, &mut tail)
        };
        if rc != ffi::SQLITE_OK {
            return Err(last_error(db, rc));
        }

        let consumed = if tail.is_null() {
            sql.len()
        } else {
            (tail as usize)
                .saturating_sub(sql.as_ptr() as usize)
                .min(sql.len())
        };
        let rest = sql.get(consumed..).unwrap_or("");
        let stmt = (!stmt.is_null()).then(|| Statement { raw: stmt, db });
        Ok((stmt, rest))
    }

    /// Compiles a single statement. Text after the first statement is
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns the engine error for invalid SQL, or an error when `sql`
    /// contains no statement at all.
    pub fn prepare(&self, sql: &str) -> Result<Statement, EngineError> {
        match self.prepare_next(sql)? {
            (Some(stmt), _) => Ok(stmt),
            (None, _) => Err(EngineError::new(ffi::SQLITE_ERROR, "no SQL statement to prepare")),
        }
    }

    /// Runs every statement in `sql` to completion, discarding result rows.
    ///
    /// Returns the number of rows inserted, updated or deleted. Execution
    /// stops at the first failing statement; statements before it stay
    /// applied.
    pub fn exec(&self, sql: &str) -> Result<i64, EngineError> {
        let before = self.total_changes();
        let mut rest = sql;
        while !rest.trim().is_empty() {
            let (stmt, tail) = self.prepare_next(rest)?;
            if let Some(mut stmt) = stmt {
                while stmt.step()? == StepResult::Row {}
            }
            if tail.len() >= rest.len() {
                break;
            }
            rest = tail;
        }
        Ok(self.total_changes() - before)
    }
}

/// A compiled statement, finalized on drop.
pub struct Statement {
    raw: *mut ffi::sqlite3_stmt,
    db: *mut ffi::sqlite3,
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement").finish_non_exhaustive()
    }
}

impl Statement {
    fn check(&self, rc: c_int) -> Result<(), EngineError> {
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(last_error(self.db, rc))
        }
    }

    /// Number of `?` parameters in the statement.
    pub fn parameter_count(&self) -> usize {
        // SAFETY: `raw` is a live statement until drop.
        let n = unsafe { ffi::sqlite3_bind_parameter_count(self.raw) };
        usize::try_from(n).unwrap_or(0)
    }

    /// Number of columns in each result row.
    pub fn column_count(&self) -> usize {
        // SAFETY: live statement.
        let n = unsafe { ffi::sqlite3_column_count(self.raw) };
        usize::try_from(n).unwrap_or(0)
    }

    /// Binds `value` to the zero-based parameter `index`.
    ///
    /// The statement must be reset (before-first) for the bind to succeed.
    pub fn bind(&mut self, index: usize, value: &Value) -> Result<(), EngineError> {
        let idx = index
            .checked_add(1)
            .and_then(|i| c_int::try_from(i).ok())
            .ok_or_else(|| EngineError::new(ffi::SQLITE_RANGE, "parameter index out of range"))?;

        // SAFETY: `raw` is live; SQLITE_TRANSIENT makes SQLite copy the
        // text/blob bytes before returning.
        let rc = unsafe {
            match value {
                Value::Null => ffi::sqlite3_bind_null(self.raw, idx),
                Value::Integer(v) => ffi::sqlite3_bind_int64(self.raw, idx, *v),
                Value::Real(v) => ffi::sqlite3_bind_double(self.raw, idx, *v),
                Value::Text(bytes) => {
                    let n = c_int::try_from(bytes.len())
                        .map_err(|_| EngineError::new(ffi::SQLITE_TOOBIG, "text value too long"))?;
                    ffi::sqlite3_bind_text(
                        self.raw,
                        idx,
                        bytes.as_ptr().cast::<c_char>(),
                        n,
                        ffi::SQLITE_TRANSIENT(),
                    )
                }
                Value::Blob(bytes) => {
                    let n = c_int::try_from(bytes.len())
                        .map_err(|_| EngineError::new(ffi::SQLITE_TOOBIG, "blob value too long"))?;
                    ffi::sqlite3_bind_blob(
                        self.raw,
                        idx,
                        bytes.as_ptr().cast(),
                        n,
                        ffi::SQLITE_TRANSIENT(),
                    )
                }
            }
        };
        self.check(rc)
    }

    /// Advances the cursor by one row.
    pub fn step(&mut self) -> Result<StepResult, EngineError> {
        // SAFETY: live statement.
        let rc = unsafe { ffi::sqlite3_step(self.raw) };
        match rc {
            ffi::SQLITE_ROW => Ok(StepResult::Row),
            ffi::SQLITE_DONE => Ok(StepResult::Done),
            rc => Err(last_error(self.db, rc)),
        }
    }

    /// Rewinds the cursor to before the first row. Bindings are kept.
    ///
    /// SQLite re-reports the error of a failed last step here; that error
    /// was already surfaced by [`Statement::step`], so it is returned but
    /// the statement is rewound either way.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        // SAFETY: live statement.
        let rc = unsafe { ffi::sqlite3_reset(self.raw) };
        self.check(rc)
    }

    /// Reads column `index` of the current row.
    ///
    /// Only meaningful after [`Statement::step`] returned
    /// [`StepResult::Row`]. Callers check `index < column_count()`.
    pub fn column_value(&self, index: usize) -> Value {
        let Ok(col) = c_int::try_from(index) else {
            return Value::Null;
        };
        // SAFETY: live statement positioned on a row; the pointers returned
        // by column_text/column_blob stay valid until the next step, reset
        // or finalize, and are copied out immediately.
        unsafe {
            match ffi::sqlite3_column_type(self.raw, col) {
                ffi::SQLITE_INTEGER => Value::Integer(ffi::sqlite3_column_int64(self.raw, col)),
                ffi::SQLITE_FLOAT => Value::Real(ffi::sqlite3_column_double(self.raw, col)),
                ffi::SQLITE_TEXT => {
                    let ptr = ffi::sqlite3_column_text(self.raw, col);
                    let len = ffi::sqlite3_column_bytes(self.raw, col);
                    Value::Text(copy_bytes(ptr.cast::<u8>(), len))
                }
                ffi::SQLITE_BLOB => {
                    let ptr = ffi::sqlite3_column_blob(self.raw, col);
                    let len = ffi::sqlite3_column_bytes(self.raw, col);
                    Value::Blob(copy_bytes(ptr.cast::<u8>(), len))
                }
                _ => Value::Null,
            }
        }
    }
}

/// Copies `len` bytes from an engine-owned buffer.
///
/// # Safety
///
/// `ptr` must be null or valid for reads of `len` bytes.
unsafe fn copy_bytes(ptr: *const u8, len: c_int) -> Vec<u8> {
    match usize::try_from(len) {
        Ok(len) if len > 0 && !ptr.is_null() => {
            // SAFETY: guaranteed by the caller.
            unsafe { std::slice::from_raw_parts(ptr, len) }.to_vec()
        }
        _ => Vec::new(),
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        // SAFETY: `raw` is live and finalized exactly once, here.
        unsafe {
            ffi::sqlite3_finalize(self.raw);
        }
    }
}

//! Statement handles and the table that owns them.
//!
//! Handles are plain integers that cross the process boundary in place of
//! pointers. Identifiers come from a counter that only moves forward, so a
//! stale identifier from a finalized statement can never resolve to a newer,
//! unrelated one. The table lives as long as the interpreter, which keeps
//! identifiers unique across CLOSE/OPEN cycles too.

use std::collections::BTreeMap;

use sqinn_core::{HandleId, Value};
use tracing::debug;

use crate::engine::{Statement, StepResult};
use crate::error::{CommandError, Result};

/// Cursor state of a live statement handle.
///
/// `Finalized` has no variant: a finalized handle is no longer in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Compiled, nothing bound yet, cursor before the first row.
    Prepared,
    /// At least one parameter bound, cursor before the first row.
    Bound,
    /// Positioned on a result row; columns are readable.
    Row,
    /// Result set exhausted.
    Done,
}

/// One prepared statement and its cursor.
#[derive(Debug)]
pub struct StatementHandle {
    id: HandleId,
    stmt: Statement,
    state: HandleState,
    parameter_count: usize,
    column_count: usize,
}

impl StatementHandle {
    fn new(id: HandleId, stmt: Statement) -> Self {
        let parameter_count = stmt.parameter_count();
        let column_count = stmt.column_count();
        Self {
            id,
            stmt,
            state: HandleState::Prepared,
            parameter_count,
            column_count,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// State the cursor returns to when rewound.
    fn rewound_state(&self) -> HandleState {
        match self.state {
            HandleState::Prepared => HandleState::Prepared,
            _ => HandleState::Bound,
        }
    }

    /// Binds `value` to the zero-based parameter `index`.
    ///
    /// Binding while on a row or after the last row rewinds the cursor, so
    /// the next step starts from the first row again. Other bindings are
    /// kept.
    ///
    /// # Errors
    ///
    /// [`CommandError::Bind`] when `index` is outside the parameter range or
    /// the engine refuses the value.
    pub fn bind(&mut self, index: usize, value: &Value) -> Result<()> {
        if index >= self.parameter_count {
            return Err(CommandError::Bind(format!(
                "bind index {index} out of range (statement has {} parameters)",
                self.parameter_count
            )));
        }
        if matches!(self.state, HandleState::Row | HandleState::Done) {
            // A failed earlier step is re-reported by reset; it was already
            // returned to the host, so only the rewind matters here.
            if let Err(err) = self.stmt.reset() {
                debug!(handle = self.id, error = %err, "reset before rebind reported stale error");
            }
            self.state = self.rewound_state();
        }
        debug!(handle = self.id, index, kind = value.type_name(), "bind");
        self.stmt.bind(index, value).map_err(|err| {
            CommandError::Bind(format!(
                "cannot bind {} to parameter {index}: {}",
                value.type_name(),
                err.message
            ))
        })?;
        self.state = HandleState::Bound;
        Ok(())
    }

    /// Advances the cursor and returns the row, or `None` when the result
    /// set is exhausted.
    ///
    /// Stepping a handle that is already `Done` keeps reporting `None`
    /// without re-running the statement; bind rewinds it.
    ///
    /// # Errors
    ///
    /// [`CommandError::Engine`] when execution fails. The cursor is then
    /// rewound to before the first row with bindings kept.
    pub fn step(&mut self) -> Result<Option<Vec<Value>>> {
        if self.state == HandleState::Done {
            return Ok(None);
        }
        match self.stmt.step() {
            Ok(StepResult::Row) => {
                self.state = HandleState::Row;
                let row = (0..self.column_count)
                    .map(|i| self.stmt.column_value(i))
                    .collect();
                Ok(Some(row))
            }
            Ok(StepResult::Done) => {
                self.state = HandleState::Done;
                Ok(None)
            }
            Err(err) => {
                let _ = self.stmt.reset();
                self.state = self.rewound_state();
                Err(CommandError::Engine(err))
            }
        }
    }

    /// Reads one column of the current row.
    ///
    /// # Errors
    ///
    /// [`CommandError::ColumnRange`] when `index` is out of range or the
    /// cursor is not on a row.
    pub fn column(&self, index: usize) -> Result<Value> {
        if self.state != HandleState::Row || index >= self.column_count {
            return Err(CommandError::ColumnRange {
                index,
                count: if self.state == HandleState::Row {
                    self.column_count
                } else {
                    0
                },
            });
        }
        Ok(self.stmt.column_value(index))
    }
}

/// Counters kept by the [`HandleTable`].
///
/// `allocated == released + live` holds at all times; after the connection
/// is closed `live` is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleStats {
    pub allocated: u64,
    pub released: u64,
    pub live: usize,
}

impl HandleStats {
    pub fn is_balanced(&self) -> bool {
        self.allocated == self.released + self.live as u64
    }
}

/// Owner of every live [`StatementHandle`].
#[derive(Debug)]
pub struct HandleTable {
    handles: BTreeMap<HandleId, StatementHandle>,
    next_id: HandleId,
    allocated: u64,
    released: u64,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            handles: BTreeMap::new(),
            next_id: 1,
            allocated: 0,
            released: 0,
        }
    }

    /// Takes ownership of `stmt` and assigns it a fresh identifier.
    pub fn allocate(&mut self, stmt: Statement) -> HandleId {
        let id = self.next_id;
        self.next_id += 1;
        self.allocated += 1;
        self.handles.insert(id, StatementHandle::new(id, stmt));
        id
    }

    /// Looks up a live handle.
    ///
    /// # Errors
    ///
    /// [`CommandError::UnknownHandle`] for an identifier that was never
    /// allocated or has been released.
    pub fn resolve(&mut self, id: HandleId) -> Result<&mut StatementHandle> {
        self.handles
            .get_mut(&id)
            .ok_or(CommandError::UnknownHandle(id))
    }

    /// Finalizes the statement and frees the identifier for good.
    ///
    /// # Errors
    ///
    /// [`CommandError::UnknownHandle`] if `id` is not live, including a
    /// second release of the same identifier.
    pub fn release(&mut self, id: HandleId) -> Result<()> {
        // dropping the handle finalizes the statement
        self.handles
            .remove(&id)
            .ok_or(CommandError::UnknownHandle(id))?;
        self.released += 1;
        Ok(())
    }

    /// Finalizes every live handle and returns how many there were.
    pub fn release_all(&mut self) -> usize {
        let count = self.handles.len();
        self.handles.clear();
        self.released += count as u64;
        count
    }

    pub fn live(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn stats(&self) -> HandleStats {
        HandleStats {
            allocated: self.allocated,
            released: self.released,
            live: self.handles.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Database, MEMORY_PATH};

    #[test]
    fn test_identifiers_are_monotonic_and_not_reused() {
        let db = Database::open(MEMORY_PATH).unwrap();
        let mut table = HandleTable::new();
        let a = table.allocate(db.prepare("SELECT 1").unwrap());
        let b = table.allocate(db.prepare("SELECT 2").unwrap());
        assert_eq!((a, b), (1, 2));
        table.release(b).unwrap();
        let c = table.allocate(db.prepare("SELECT 3").unwrap());
        assert_eq!(c, 3);
        table.release_all();
    }

    #[test]
    fn test_double_release_is_unknown_handle() {
        let db = Database::open(MEMORY_PATH).unwrap();
        let mut table = HandleTable::new();
        let id = table.allocate(db.prepare("SELECT 1").unwrap());
        table.release(id).unwrap();
        assert_eq!(table.release(id), Err(CommandError::UnknownHandle(id)));
        assert!(matches!(
            table.resolve(id),
            Err(CommandError::UnknownHandle(_))
        ));
    }

    #[test]
    fn test_stats_balance() {
        let db = Database::open(MEMORY_PATH).unwrap();
        let mut table = HandleTable::new();
        for _ in 0..3 {
            table.allocate(db.prepare("SELECT 1").unwrap());
        }
        table.release(2).unwrap();
        let stats = table.stats();
        assert_eq!(
            stats,
            HandleStats {
                allocated: 3,
                released: 1,
                live: 2
            }
        );
        assert!(stats.is_balanced());
        assert_eq!(table.release_all(), 2);
        assert_eq!(table.stats().released, 3);
        assert_eq!(table.stats().live, 0);
    }

    #[test]
    fn test_state_transitions() {
        let db = Database::open(MEMORY_PATH).unwrap();
        let mut table = HandleTable::new();
        let id = table.allocate(db.prepare("SELECT ?").unwrap());
        let handle = table.resolve(id).unwrap();
        assert_eq!(handle.state(), HandleState::Prepared);

        handle.bind(0, &Value::Integer(5)).unwrap();
        assert_eq!(handle.state(), HandleState::Bound);

        assert_eq!(handle.step().unwrap(), Some(vec![Value::Integer(5)]));
        assert_eq!(handle.state(), HandleState::Row);
        assert_eq!(handle.column(0).unwrap(), Value::Integer(5));

        assert_eq!(handle.step().unwrap(), None);
        assert_eq!(handle.state(), HandleState::Done);
        // stays done
        assert_eq!(handle.step().unwrap(), None);

        handle.bind(0, &Value::Integer(6)).unwrap();
        assert_eq!(handle.state(), HandleState::Bound);
        assert_eq!(handle.step().unwrap(), Some(vec![Value::Integer(6)]));
        table.release_all();
    }

    #[test]
    fn test_bind_out_of_range() {
        let db = Database::open(MEMORY_PATH).unwrap();
        let mut table = HandleTable::new();
        let id = table.allocate(db.prepare("SELECT ?").unwrap());
        let handle = table.resolve(id).unwrap();
        assert!(matches!(
            handle.bind(1, &Value::Null),
            Err(CommandError::Bind(_))
        ));
        // a failed bind leaves the state alone
        assert_eq!(handle.state(), HandleState::Prepared);
        table.release_all();
    }

    #[test]
    fn test_rejected_rebind_leaves_cursor_rewound() {
        let db = Database::open(MEMORY_PATH).unwrap();
        // SAFETY: live connection; only lowers a per-connection limit.
        unsafe {
            rusqlite::ffi::sqlite3_limit(db.raw(), rusqlite::ffi::SQLITE_LIMIT_LENGTH, 100);
        }
        let mut table = HandleTable::new();
        let id = table.allocate(db.prepare("SELECT ?").unwrap());
        let handle = table.resolve(id).unwrap();
        handle.bind(0, &Value::Integer(7)).unwrap();
        assert_eq!(handle.step().unwrap(), Some(vec![Value::Integer(7)]));
        assert_eq!(handle.state(), HandleState::Row);

        let err = handle.bind(0, &Value::Blob(vec![0; 1000])).unwrap_err();
        assert!(matches!(&err, CommandError::Bind(msg) if msg.contains("blob")), "{err}");
        assert_eq!(handle.state(), HandleState::Bound);
        // the earlier binding survives and the query starts over
        assert_eq!(handle.step().unwrap(), Some(vec![Value::Integer(7)]));
        table.release_all();
    }

    #[test]
    fn test_column_outside_row() {
        let db = Database::open(MEMORY_PATH).unwrap();
        let mut table = HandleTable::new();
        let id = table.allocate(db.prepare("SELECT 1, 2").unwrap());
        let handle = table.resolve(id).unwrap();
        assert!(matches!(
            handle.column(0),
            Err(CommandError::ColumnRange { index: 0, count: 0 })
        ));
        handle.step().unwrap();
        assert!(matches!(
            handle.column(2),
            Err(CommandError::ColumnRange { index: 2, count: 2 })
        ));
        assert_eq!(handle.column(1).unwrap(), Value::Integer(2));
        table.release_all();
    }

    #[test]
    fn test_step_error_rewinds() {
        let db = Database::open(MEMORY_PATH).unwrap();
        db.exec("CREATE TABLE t (a INTEGER PRIMARY KEY)").unwrap();
        db.exec("INSERT INTO t VALUES (1)").unwrap();
        let mut table = HandleTable::new();
        let id = table.allocate(db.prepare("INSERT INTO t VALUES (?)").unwrap());
        let handle = table.resolve(id).unwrap();
        handle.bind(0, &Value::Integer(1)).unwrap();
        assert!(matches!(handle.step(), Err(CommandError::Engine(_))));
        assert_eq!(handle.state(), HandleState::Bound);

        handle.bind(0, &Value::Integer(2)).unwrap();
        assert_eq!(handle.step().unwrap(), None);
        table.release_all();
    }
}

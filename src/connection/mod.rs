//! Connections: where rendered statements run.
//!
//! The engine only needs positional binding, row reading and generated
//! keys, so any driver can sit behind [`Connection`]. Transactions, pooling
//! and statement timeouts belong to the connection, not the engine.

mod sqlite;

pub use sqlite::SqliteConnection;

use std::time::Duration;

use crate::sql::{Dialect, Statement};
use crate::value::{Key, Value};

/// Errors raised by a connection while running a statement.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database error: {0}")]
    Database(String),

    #[error("statement exceeded its {0:?} timeout")]
    Timeout(Duration),

    #[error("statement was cancelled")]
    Cancelled,
}

/// Fetched rows with their column names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Rows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[Value]> {
        self.rows.iter().map(Vec::as_slice)
    }
}

/// Outcome of a data-changing statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecuteResult {
    pub affected: u64,
    /// Keys generated for the statement's `generated_key` column, in row order.
    pub generated_keys: Vec<Key>,
}

/// Cancels statements running on the connection that issued the handle.
pub trait CancelHandle: Send + Sync {
    fn cancel(&self);
}

/// A database session able to run one statement at a time.
pub trait Connection {
    fn dialect(&self) -> Dialect;

    fn query(&self, statement: &Statement) -> Result<Rows, ConnectionError>;

    fn execute(&self, statement: &Statement) -> Result<ExecuteResult, ConnectionError>;

    /// Run `statement` and map every row.
    fn query_map<T, F>(&self, statement: &Statement, mut mapper: F) -> Result<Vec<T>, ConnectionError>
    where
        Self: Sized,
        F: FnMut(&[Value]) -> T,
    {
        Ok(self.query(statement)?.iter().map(&mut mapper).collect())
    }

    /// Handle for cancelling a running statement from another thread, when
    /// the driver supports it.
    fn cancel_handle(&self) -> Option<Box<dyn CancelHandle>> {
        None
    }
}

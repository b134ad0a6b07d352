//! SQLite connections over rusqlite.

use std::path::Path;

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, ErrorCode, InterruptHandle};

use super::{CancelHandle, Connection, ConnectionError, ExecuteResult, Rows};
use crate::sql::{Dialect, Statement};
use crate::value::{Key, Value};

/// A single SQLite session.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConnectionError> {
        Ok(Self::from_connection(rusqlite::Connection::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, ConnectionError> {
        Ok(Self::from_connection(rusqlite::Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Run semicolon-separated SQL without parameters (schema setup).
    pub fn execute_batch(&self, sql: &str) -> Result<(), ConnectionError> {
        self.conn.execute_batch(sql).map_err(map_error)
    }

    pub fn inner(&self) -> &rusqlite::Connection {
        &self.conn
    }

    fn prepare(&self, statement: &Statement) -> Result<rusqlite::Statement<'_>, ConnectionError> {
        if let Some(timeout) = statement.timeout {
            self.conn.busy_timeout(timeout).map_err(map_error)?;
        }
        self.conn.prepare(&statement.sql).map_err(map_error)
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&self, statement: &Statement) -> Result<Rows, ConnectionError> {
        let mut stmt = self.prepare(statement)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut out = Vec::new();
        let mut rows = stmt
            .query(params_from_iter(statement.bind_values()))
            .map_err(map_error)?;
        while let Some(row) = rows.next().map_err(map_error)? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(read_value(row.get_ref(i).map_err(map_error)?));
            }
            out.push(values);
        }
        Ok(Rows { columns, rows: out })
    }

    fn execute(&self, statement: &Statement) -> Result<ExecuteResult, ConnectionError> {
        let mut stmt = self.prepare(statement)?;
        let affected = stmt
            .execute(params_from_iter(statement.bind_values()))
            .map_err(map_error)?;
        let generated_keys = if statement.generated_key.is_some() && affected > 0 {
            vec![Key::Int(self.conn.last_insert_rowid())]
        } else {
            Vec::new()
        };
        Ok(ExecuteResult {
            affected: affected as u64,
            generated_keys,
        })
    }

    fn cancel_handle(&self) -> Option<Box<dyn CancelHandle>> {
        Some(Box::new(SqliteCancel(self.conn.get_interrupt_handle())))
    }
}

struct SqliteCancel(InterruptHandle);

impl CancelHandle for SqliteCancel {
    fn cancel(&self) {
        self.0.interrupt();
    }
}

fn map_error(err: rusqlite::Error) -> ConnectionError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::OperationInterrupted => {
            ConnectionError::Cancelled
        }
        _ => ConnectionError::Sqlite(err),
    }
}

fn read_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Int(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b.as_slice())),
        })
    }
}

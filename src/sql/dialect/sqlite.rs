//! SQLite dialect.
//!
//! SQLite differences from ANSI:
//! - Booleans are integers (1/0)
//! - LIMIT ... OFFSET ...; a bare OFFSET needs `LIMIT -1`
//! - No sequences (INTEGER PRIMARY KEY rowid aliasing)
//! - SQLITE_MAX_VARIABLE_NUMBER defaults to 32766 since 3.32

use super::helpers;
use super::SqlDialect;

/// SQLite dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn unbounded_limit(&self) -> Option<&'static str> {
        Some("-1")
    }

    fn next_value(&self, _sequence: &str) -> Option<String> {
        None
    }
}

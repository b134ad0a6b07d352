//! SQL Dialect definitions and formatting rules.
//!
//! This module provides a trait-based abstraction for SQL dialect differences.
//! Each dialect implements `SqlDialect` to handle its specific syntax:
//!
//! - Identifier quoting: `"` (ANSI/PG/SQLite/Oracle), `` ` `` (MySQL), `[]` (T-SQL)
//! - Pagination: LIMIT/OFFSET vs OFFSET FETCH, or no server-side paging at all
//! - Sequences: `nextval('s')` vs `s.NEXTVAL` vs `NEXT VALUE FOR s`
//! - Bound parameter ceilings, IN-list limits and identifier lengths
//! - Boolean literals: true/false vs 1/0
//!
//! # Usage
//!
//! ```ignore
//! use heron::sql::dialect::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::Postgres;
//! let quoted = dialect.quote_identifier("user");  // "user"
//! ```

mod ansi;
pub mod helpers;
mod mysql;
mod oracle;
mod postgres;
mod sqlite;
mod tsql;

// Ansi is exported as a reference implementation for testing and documentation.
// It is NOT included in the Dialect enum.
pub use ansi::Ansi;
pub use mysql::MySql;
pub use oracle::Oracle;
pub use postgres::Postgres;
pub use sqlite::Sqlite;
pub use tsql::TSql;

use serde::{Deserialize, Serialize};

use super::token::TokenStream;

/// How a result window (offset/limit) is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PagingMethod {
    /// `LIMIT m OFFSET n`
    LimitOffset,
    /// `OFFSET n ROWS FETCH NEXT m ROWS ONLY`
    OffsetFetch,
    /// No server-side syntax; ids are fetched and sliced in the application.
    TwoQuery,
}

impl PagingMethod {
    /// Whether the method has SQL syntax at all.
    pub fn is_server_side(self) -> bool {
        !matches!(self, PagingMethod::TwoQuery)
    }
}

/// SQL dialect trait - defines how SQL constructs are rendered.
///
/// Implementations handle dialect-specific syntax differences.
/// The default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    ///
    /// - ANSI/PostgreSQL/SQLite/Oracle: `"identifier"`
    /// - MySQL: `` `identifier` ``
    /// - T-SQL: `[identifier]`
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal.
    ///
    /// All dialects use single quotes with `''` for escaping.
    /// Override for Unicode prefix (T-SQL N'...').
    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    /// Format a boolean literal.
    ///
    /// - PostgreSQL: `true`/`false`
    /// - MySQL/T-SQL/SQLite/Oracle: `1`/`0`
    fn format_bool(&self, b: bool) -> &'static str;

    /// Format a NULL literal.
    fn format_null(&self) -> &'static str {
        "NULL"
    }

    /// Longest identifier the server keeps intact, in bytes.
    ///
    /// Longer aliases are shortened by [`helpers::fit_identifier`].
    fn max_identifier_length(&self) -> usize {
        128
    }

    /// Whether table aliases are introduced with `AS`.
    ///
    /// Oracle accepts `AS` only for column aliases.
    fn table_alias_keyword(&self) -> bool {
        true
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Paging method used when the caller does not pick one.
    fn paging_method(&self) -> PagingMethod {
        PagingMethod::LimitOffset
    }

    /// Literal standing in for "no limit" when only an offset is requested.
    ///
    /// SQLite and MySQL reject a bare OFFSET.
    fn unbounded_limit(&self) -> Option<&'static str> {
        None
    }

    /// Emit the paging clause for `method`.
    ///
    /// Returns an empty stream for [`PagingMethod::TwoQuery`].
    fn emit_paging(
        &self,
        method: PagingMethod,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> TokenStream {
        match method {
            PagingMethod::LimitOffset => {
                helpers::emit_limit_offset_standard(limit, offset, self.unbounded_limit())
            }
            PagingMethod::OffsetFetch => helpers::emit_offset_fetch(limit, offset),
            PagingMethod::TwoQuery => TokenStream::new(),
        }
    }

    /// Whether this dialect requires ORDER BY for OFFSET/LIMIT.
    ///
    /// T-SQL requires ORDER BY when using OFFSET FETCH.
    fn requires_order_by_for_offset(&self) -> bool {
        false
    }

    // =========================================================================
    // Sequences and Parameters
    // =========================================================================

    /// Expression yielding the next value of `sequence`, if sequences exist.
    fn next_value(&self, sequence: &str) -> Option<String> {
        Some(format!(
            "NEXT VALUE FOR {}",
            self.quote_identifier(sequence)
        ))
    }

    /// Maximum number of bound parameters in one statement.
    fn max_parameters(&self) -> usize {
        32_766
    }

    /// Maximum number of expressions in one `IN (...)` list.
    fn max_in_list(&self) -> usize {
        self.max_parameters()
    }

    /// Whether `INSERT INTO t DEFAULT VALUES` is accepted.
    ///
    /// Dialects without it insert `VALUES (DEFAULT)` into one column.
    fn supports_default_values(&self) -> bool {
        true
    }

    /// Whether `INSERT ... VALUES (...), (...)` is accepted.
    fn supports_multi_row_insert(&self) -> bool {
        true
    }

    /// Whether a subquery reading the statement's own target table (or an
    /// `IN` subquery carrying LIMIT) must be wrapped in a derived table.
    ///
    /// MySQL rejects both forms otherwise.
    fn wrap_self_referencing_subquery(&self) -> bool {
        false
    }
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    #[default]
    Postgres,
    #[serde(rename = "mysql")]
    MySql,
    Sqlite,
    #[serde(rename = "tsql")]
    TSql,
    Oracle,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Postgres => &Postgres,
            Dialect::MySql => &MySql,
            Dialect::Sqlite => &Sqlite,
            Dialect::TSql => &TSql,
            Dialect::Oracle => &Oracle,
        }
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn format_null(&self) -> &'static str {
        self.dialect().format_null()
    }

    fn max_identifier_length(&self) -> usize {
        self.dialect().max_identifier_length()
    }

    fn table_alias_keyword(&self) -> bool {
        self.dialect().table_alias_keyword()
    }

    fn paging_method(&self) -> PagingMethod {
        self.dialect().paging_method()
    }

    fn unbounded_limit(&self) -> Option<&'static str> {
        self.dialect().unbounded_limit()
    }

    fn emit_paging(
        &self,
        method: PagingMethod,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> TokenStream {
        self.dialect().emit_paging(method, limit, offset)
    }

    fn requires_order_by_for_offset(&self) -> bool {
        self.dialect().requires_order_by_for_offset()
    }

    fn next_value(&self, sequence: &str) -> Option<String> {
        self.dialect().next_value(sequence)
    }

    fn max_parameters(&self) -> usize {
        self.dialect().max_parameters()
    }

    fn max_in_list(&self) -> usize {
        self.dialect().max_in_list()
    }

    fn supports_default_values(&self) -> bool {
        self.dialect().supports_default_values()
    }

    fn supports_multi_row_insert(&self) -> bool {
        self.dialect().supports_multi_row_insert()
    }

    fn wrap_self_referencing_subquery(&self) -> bool {
        self.dialect().wrap_self_referencing_subquery()
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}

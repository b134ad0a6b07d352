//! MySQL SQL dialect.
//!
//! MySQL differences from ANSI:
//! - Backtick identifier quoting (`` `name` ``)
//! - Boolean is TINYINT(1), returns 1/0
//! - LIMIT ... OFFSET ... for pagination; OFFSET alone is rejected
//! - No sequences (AUTO_INCREMENT + LAST_INSERT_ID())
//! - 64-character table aliases
//! - No `DEFAULT VALUES`; a default row is `(col) VALUES (DEFAULT)`
//! - A DELETE may not select from its own table in a subquery, and
//!   `IN (subquery)` may not carry LIMIT, unless wrapped in a derived table

use super::helpers;
use super::SqlDialect;

/// MySQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn max_identifier_length(&self) -> usize {
        64
    }

    // Uses default paging (LIMIT ... OFFSET ...)

    fn unbounded_limit(&self) -> Option<&'static str> {
        Some("18446744073709551615")
    }

    fn next_value(&self, _sequence: &str) -> Option<String> {
        None
    }

    fn max_parameters(&self) -> usize {
        65_535
    }

    fn supports_default_values(&self) -> bool {
        false
    }

    fn wrap_self_referencing_subquery(&self) -> bool {
        true
    }
}

//! PostgreSQL SQL dialect.
//!
//! PostgreSQL features:
//! - ANSI identifier quoting (`"`)
//! - Native boolean type (true/false)
//! - Sequences via `nextval('name')`
//! - 65535 bind parameters per statement (wire protocol Int16 count)
//! - Identifiers silently truncated past NAMEDATALEN - 1 (63 bytes)

use super::helpers;
use super::SqlDialect;

/// PostgreSQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }

    fn max_identifier_length(&self) -> usize {
        63
    }

    // Uses default paging (LIMIT ... OFFSET ...)

    fn next_value(&self, sequence: &str) -> Option<String> {
        Some(format!("nextval({})", helpers::quote_string_single(sequence)))
    }

    fn max_parameters(&self) -> usize {
        65_535
    }
}

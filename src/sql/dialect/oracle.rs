//! Oracle dialect.
//!
//! Oracle differences from ANSI:
//! - No `AS` before table aliases
//! - No boolean SQL type before 23c (1/0)
//! - OFFSET FETCH paging (12c+)
//! - `name.NEXTVAL` sequence references
//! - At most 1000 expressions in an IN list (ORA-01795)
//! - No multi-row VALUES lists and no `DEFAULT VALUES`
//! - 30-byte identifiers before 12.2

use super::helpers;
use super::{PagingMethod, SqlDialect};

/// Oracle dialect.
#[derive(Debug, Clone, Copy)]
pub struct Oracle;

impl SqlDialect for Oracle {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn max_identifier_length(&self) -> usize {
        30
    }

    fn table_alias_keyword(&self) -> bool {
        false
    }

    fn paging_method(&self) -> PagingMethod {
        PagingMethod::OffsetFetch
    }

    fn next_value(&self, sequence: &str) -> Option<String> {
        Some(format!("{sequence}.NEXTVAL"))
    }

    fn max_parameters(&self) -> usize {
        65_535
    }

    fn max_in_list(&self) -> usize {
        1_000
    }

    fn supports_default_values(&self) -> bool {
        false
    }

    fn supports_multi_row_insert(&self) -> bool {
        false
    }
}

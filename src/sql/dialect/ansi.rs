//! ANSI SQL dialect - base reference implementation.
//!
//! This provides the ANSI SQL standard behavior as a reference.
//! Most dialects derive from ANSI with specific overrides.

use super::{helpers, PagingMethod, SqlDialect};

/// ANSI SQL dialect (reference implementation).
#[derive(Debug, Clone, Copy)]
pub struct Ansi;

impl SqlDialect for Ansi {
    fn name(&self) -> &'static str {
        "ansi"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        if b {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    fn paging_method(&self) -> PagingMethod {
        PagingMethod::OffsetFetch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ansi_sequence_and_paging() {
        assert_eq!(Ansi.next_value("s").as_deref(), Some("NEXT VALUE FOR \"s\""));
        assert_eq!(Ansi.paging_method(), PagingMethod::OffsetFetch);
    }
}

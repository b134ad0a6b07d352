//! Shared helper functions for SQL dialect implementations.
//!
//! This module provides reusable building blocks that dialects can compose
//! to implement the `SqlDialect` trait with minimal duplication.

use std::borrow::Cow;

use sha2::{Digest, Sha256};

use super::super::token::{Token, TokenStream};

/// Hex digits of the digest kept in a shortened identifier.
const DIGEST_CHARS: usize = 8;

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: Postgres, SQLite, Oracle
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: MySQL
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Quote identifier with square brackets.
/// Used by: T-SQL (SQL Server, Azure SQL)
pub fn quote_bracket(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

/// Shorten `ident` to at most `max` bytes.
///
/// Identifiers within the limit are returned as is. Longer ones keep a
/// prefix and end in `_` plus a digest of the whole name, so distinct
/// names stay distinct and the same name always shortens the same way.
pub fn fit_identifier(ident: &str, max: usize) -> Cow<'_, str> {
    if ident.len() <= max {
        return Cow::Borrowed(ident);
    }
    let digest = format!("{:x}", Sha256::digest(ident.as_bytes()));
    let mut keep = max.saturating_sub(DIGEST_CHARS + 1);
    while !ident.is_char_boundary(keep) {
        keep -= 1;
    }
    Cow::Owned(format!("{}_{}", &ident[..keep], &digest[..DIGEST_CHARS]))
}

// =============================================================================
// String Quoting
// =============================================================================

/// Quote string with single quotes (standard SQL).
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Quote string with N prefix for Unicode (T-SQL).
pub fn quote_string_unicode(s: &str) -> String {
    format!("N'{}'", s.replace('\'', "''"))
}

// =============================================================================
// Boolean Formatting
// =============================================================================

/// Format boolean as literal true/false.
/// Used by: Postgres
pub fn format_bool_literal(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Format boolean as numeric 1/0.
/// Used by: T-SQL, MySQL, SQLite, Oracle
pub fn format_bool_numeric(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

// =============================================================================
// Pagination
// =============================================================================

/// Emit LIMIT ... OFFSET ... (MySQL/SQLite/Postgres style).
///
/// `unbounded` is emitted as the limit when only an offset is given, for
/// engines that refuse a bare OFFSET.
pub fn emit_limit_offset_standard(
    limit: Option<u64>,
    offset: Option<u64>,
    unbounded: Option<&'static str>,
) -> TokenStream {
    let mut ts = TokenStream::new();

    match (limit, offset, unbounded) {
        (Some(lim), _, _) => {
            ts.push(Token::Limit)
                .space()
                .push(Token::LitInt(lim as i64));
        }
        (None, Some(_), Some(all)) => {
            ts.push(Token::Limit).space().push(Token::Raw(all.into()));
        }
        _ => {}
    }

    if let Some(off) = offset {
        if !ts.is_empty() {
            ts.space();
        }
        ts.push(Token::Offset)
            .space()
            .push(Token::LitInt(off as i64));
    }

    ts
}

/// Emit OFFSET ... ROWS FETCH NEXT ... ROWS ONLY (standard SQL:2008).
/// Used by: T-SQL, Oracle 12c+
/// Note: Requires ORDER BY clause in T-SQL
pub fn emit_offset_fetch(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    let off = offset.unwrap_or(0);
    ts.push(Token::Offset)
        .space()
        .push(Token::LitInt(off as i64))
        .space()
        .push(Token::Rows);

    if let Some(lim) = limit {
        ts.space()
            .push(Token::Fetch)
            .space()
            .push(Token::Next)
            .space()
            .push(Token::LitInt(lim as i64))
            .space()
            .push(Token::Rows)
            .space()
            .push(Token::Only);
    }

    ts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::dialect::Dialect;

    #[test]
    fn test_quote_double_escapes() {
        assert_eq!(quote_double("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_fit_identifier_keeps_short_names() {
        assert_eq!(fit_identifier("Author$books$Book", 63), "Author$books$Book");
        assert!(matches!(fit_identifier("Author", 6), Cow::Borrowed(_)));
    }

    #[test]
    fn test_fit_identifier_separates_shared_prefixes() {
        let base = "Organisation$departments$Department$employees$Employee$";
        let primary = format!("{base}supervisor_primary$Employee");
        let secondary = format!("{base}supervisor_secondary$Employee");
        assert_eq!(primary[..63], secondary[..63]);

        let a = fit_identifier(&primary, 63);
        let b = fit_identifier(&secondary, 63);
        assert_eq!(a.len(), 63);
        assert_eq!(b.len(), 63);
        assert_ne!(a, b);
        assert_eq!(a, fit_identifier(&primary, 63));
        assert!(a.starts_with("Organisation$departments$"));
    }

    #[test]
    fn test_fit_identifier_respects_char_boundaries() {
        let name = "ÄÄÄÄÄÄÄÄÄÄÄÄ";
        let fitted = fit_identifier(name, 20);
        assert_eq!(fitted.len(), 19);
        assert!(fitted.starts_with("ÄÄÄÄÄ_"));
    }

    #[test]
    fn test_limit_only() {
        let ts = emit_limit_offset_standard(Some(10), None, Some("-1"));
        assert_eq!(ts.serialize(Dialect::Sqlite), "LIMIT 10");
    }

    #[test]
    fn test_offset_fetch_without_limit() {
        let ts = emit_offset_fetch(None, Some(5));
        assert_eq!(ts.serialize(Dialect::TSql), "OFFSET 5 ROWS");
    }
}

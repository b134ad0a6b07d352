//! DML (Data Manipulation Language) support.
//!
//! This module provides types and builders for generating DML statements
//! (INSERT, UPDATE, DELETE) across different SQL dialects.
//!
//! # Examples
//!
//! ```ignore
//! use heron::sql::dml::{Insert, Update, Delete};
//! use heron::sql::expr::{col, ExprExt};
//! use heron::sql::statement::Parameter;
//!
//! let insert = Insert::into("author")
//!     .columns(["id", "name"])
//!     .values([Parameter::new("id", 1i64), Parameter::new("name", "Ann")]);
//!
//! let update = Update::table("author")
//!     .set("name", Parameter::new("name", "Bea"))
//!     .filter(col("id").eq(Parameter::new("id", 1i64)));
//!
//! let delete = Delete::from("author").filter(col("id").eq(Parameter::new("id", 1i64)));
//! ```

use super::dialect::{Dialect, SqlDialect};
use super::expr::{Expr, ExprExt};
use super::statement::Statement;
use super::token::{Token, TokenStream};

// ============================================================================
// INSERT
// ============================================================================

/// INSERT statement, possibly multi-row.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Insert {
    pub schema: Option<String>,
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Vec<Expr>>,
    /// Column defaulted when the row has no explicit values.
    pub default_column: Option<String>,
}

impl Insert {
    /// Create a new INSERT statement.
    pub fn into(table: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: table.into(),
            columns: Vec::new(),
            values: Vec::new(),
            default_column: None,
        }
    }

    /// Insert one row of column defaults. `column` is named for dialects
    /// that cannot insert a row without listing a column.
    pub fn default_values(mut self, column: impl Into<String>) -> Self {
        self.columns.clear();
        self.values.clear();
        self.default_column = Some(column.into());
        self
    }

    /// Set the schema.
    pub fn schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    /// Set the columns to insert.
    pub fn columns(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns = cols.into_iter().map(|c| c.into()).collect();
        self
    }

    /// Add a row of values.
    pub fn values(mut self, vals: impl IntoIterator<Item = impl Into<Expr>>) -> Self {
        self.values.push(vals.into_iter().map(|v| v.into()).collect());
        self
    }

    /// Add multiple rows of values.
    pub fn values_many(mut self, rows: impl IntoIterator<Item = Vec<Expr>>) -> Self {
        self.values.extend(rows);
        self
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    pub fn to_statement(&self, dialect: Dialect) -> Statement {
        Statement::from_tokens(&self.to_tokens(dialect), dialect)
    }

    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Insert)
            .space()
            .push(Token::Into)
            .space()
            .push(Token::QualifiedIdent {
                schema: self.schema.clone(),
                name: self.table.clone(),
            });

        if let Some(column) = self.default_column.as_ref().filter(|_| self.values.is_empty()) {
            if dialect.supports_default_values() {
                ts.space().push(Token::Default).space().push(Token::Values);
            } else {
                ts.space()
                    .lparen()
                    .push(Token::Ident(column.clone()))
                    .rparen()
                    .newline()
                    .push(Token::Values)
                    .space()
                    .lparen()
                    .push(Token::Default)
                    .rparen();
            }
            return ts;
        }

        if !self.columns.is_empty() {
            ts.space().lparen();
            for (i, col) in self.columns.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.push(Token::Ident(col.clone()));
            }
            ts.rparen();
        }

        ts.newline().push(Token::Values);
        for (row_idx, row) in self.values.iter().enumerate() {
            if row_idx > 0 {
                ts.comma();
            }
            ts.space().lparen();
            for (i, val) in row.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&val.to_tokens(dialect));
            }
            ts.rparen();
        }

        ts
    }
}

// ============================================================================
// UPDATE
// ============================================================================

/// UPDATE statement.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Update {
    pub schema: Option<String>,
    pub table: String,
    pub assignments: Vec<(String, Expr)>,
    pub where_clause: Option<Expr>,
}

impl Update {
    /// Create a new UPDATE statement.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: table.into(),
            assignments: Vec::new(),
            where_clause: None,
        }
    }

    pub fn schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    /// Add a SET assignment.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.assignments.push((column.into(), value.into()));
        self
    }

    /// Add a WHERE condition, AND-ed with any existing one.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    pub fn to_statement(&self, dialect: Dialect) -> Statement {
        Statement::from_tokens(&self.to_tokens(dialect), dialect)
    }

    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Update)
            .space()
            .push(Token::QualifiedIdent {
                schema: self.schema.clone(),
                name: self.table.clone(),
            });

        ts.newline().push(Token::Set).space();
        for (i, (column, value)) in self.assignments.iter().enumerate() {
            if i > 0 {
                ts.comma().space();
            }
            ts.push(Token::Ident(column.clone()))
                .space()
                .push(Token::Eq)
                .space()
                .append(&value.to_tokens(dialect));
        }

        if let Some(where_clause) = &self.where_clause {
            ts.newline().push(Token::Where).space();
            ts.append(&where_clause.to_tokens(dialect));
        }

        ts
    }
}

// ============================================================================
// DELETE
// ============================================================================

/// DELETE statement.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Delete {
    pub schema: Option<String>,
    pub table: String,
    pub where_clause: Option<Expr>,
}

impl Delete {
    /// Create a new DELETE statement.
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: table.into(),
            where_clause: None,
        }
    }

    pub fn schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    /// Add a WHERE condition, AND-ed with any existing one.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    pub fn to_statement(&self, dialect: Dialect) -> Statement {
        Statement::from_tokens(&self.to_tokens(dialect), dialect)
    }

    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Delete)
            .space()
            .push(Token::From)
            .space()
            .push(Token::QualifiedIdent {
                schema: self.schema.clone(),
                name: self.table.clone(),
            });

        if let Some(where_clause) = &self.where_clause {
            ts.newline().push(Token::Where).space();
            ts.append(&where_clause.to_tokens(dialect));
        }

        ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::expr::col;
    use crate::sql::statement::Parameter;

    #[test]
    fn test_insert_multi_row() {
        let insert = Insert::into("tag")
            .columns(["id", "label"])
            .values([Parameter::new("id", 1i64), Parameter::new("label", "a")])
            .values([Parameter::new("id", 2i64), Parameter::new("label", "b")]);
        let st = insert.to_statement(Dialect::Sqlite);

        assert_eq!(
            st.sql,
            "INSERT INTO \"tag\" (\"id\", \"label\")\nVALUES (?, ?), (?, ?)"
        );
        assert_eq!(st.bind_count(), 4);
    }

    #[test]
    fn test_insert_sequence_value() {
        let insert = Insert::into("book")
            .columns(["id", "title"])
            .values(vec![
                Expr::NextValue("book_seq".into()),
                Parameter::new("title", "Dune").into(),
            ]);
        let st = insert.to_statement(Dialect::Oracle);

        assert!(st.sql.contains("VALUES (book_seq.NEXTVAL, ?)"));
        assert_eq!(st.parameters.len(), 2);
        assert_eq!(st.bind_count(), 1);
    }

    #[test]
    fn test_insert_default_row() {
        let insert = Insert::into("tag").schema(Some("lib".into())).default_values("id");
        assert_eq!(insert.to_sql(Dialect::Postgres), "INSERT INTO \"lib\".\"tag\" DEFAULT VALUES");
        assert_eq!(insert.to_sql(Dialect::TSql), "INSERT INTO [lib].[tag] DEFAULT VALUES");
        assert_eq!(
            insert.to_sql(Dialect::Oracle),
            "INSERT INTO \"lib\".\"tag\" (\"id\")\nVALUES (DEFAULT)"
        );
        assert_eq!(insert.to_sql(Dialect::MySql), "INSERT INTO `lib`.`tag` (`id`)\nVALUES (DEFAULT)");
        assert_eq!(insert.to_statement(Dialect::Sqlite).bind_count(), 0);
    }

    #[test]
    fn test_update_with_where() {
        let update = Update::table("author")
            .set("name", Parameter::new("name", "Bea"))
            .filter(col("id").eq(Parameter::new("id", 1i64)));

        assert_eq!(
            update.to_sql(Dialect::MySql),
            "UPDATE `author`\nSET `name` = ?\nWHERE `id` = ?"
        );
    }

    #[test]
    fn test_delete_with_schema() {
        let delete = Delete::from("author")
            .schema(Some("dbo".into()))
            .filter(col("id").eq(Parameter::new("id", 1i64)));

        assert_eq!(
            delete.to_sql(Dialect::TSql),
            "DELETE FROM [dbo].[author]\nWHERE [id] = ?"
        );
    }

    mod snapshot_tests {
        use super::*;
        use crate::sql::test_utils::validate_sql;
        use insta::assert_snapshot;

        #[test]
        fn test_update_postgres() {
            let sql = Update::table("book")
                .set("title", Parameter::new("title", "Dune"))
                .set("author_id", Parameter::new("author_id", 1i64))
                .filter(col("id").eq(Parameter::new("id", 9i64)))
                .to_sql(Dialect::Postgres);
            assert_snapshot!(sql, @r#"
            UPDATE "book"
            SET "title" = ?, "author_id" = ?
            WHERE "id" = ?
            "#);
            validate_sql(&sql, Dialect::Postgres).unwrap();
        }
    }
}

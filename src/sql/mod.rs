//! SQL generation module.
//!
//! This module provides a type-safe SQL builder that generates multi-dialect SQL.
//! It includes:
//!
//! - [`query`] - SELECT query builder
//! - [`expr`] - Expression AST and builder DSL
//! - [`dml`] - Data Manipulation Language (INSERT, UPDATE, DELETE)
//! - [`statement`] - Rendered statements with positional parameters
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - SQL dialect implementations

pub mod dialect;
pub mod dml;
pub mod expr;
pub mod query;
pub mod statement;
pub mod token;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types at the sql module level
pub use dialect::{Dialect, PagingMethod, SqlDialect};
pub use dml::{Delete, Insert, Update};
pub use expr::{
    col, conjunction, count_distinct, disjunction, exists, lit_int, lit_null, lit_str, param,
    star, table_col, BinaryOperator, Expr, ExprExt, Literal, UnaryOperator,
};
pub use query::{
    Join, JoinType, LimitOffset, OrderByExpr, Query, SelectExpr, SortDir, TableRef, TableSource,
};
pub use statement::{Parameter, Statement};
pub use token::{Token, TokenStream};

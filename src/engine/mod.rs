//! Query builders: Select, Upsert, Delete and recursive Hydrate.
//!
//! Builders hold a borrowed [`MappingProvider`](crate::mapping::MappingProvider)
//! and render against the dialect of the [`Connection`] they execute on.
//! Every statement goes through [`run_query`] or [`run_execute`], which log
//! it and attach it to any failure.

mod delete;
mod hydrate;
mod mapper;
mod options;
mod select;
mod serialized;
mod upsert;

pub use delete::Delete;
pub use hydrate::{Hydrate, HydrateReport};
pub use options::{ExecutionOptions, Strategy};
pub use select::Select;
pub use serialized::{SerializedJoin, SerializedOrder, SerializedPage, SerializedQuery};
pub use upsert::{Upsert, UpsertSummary};

use crate::connection::{Connection, ExecuteResult, Rows};
use crate::error::{Error, Result};
use crate::sql::Statement;

pub(crate) fn run_query(conn: &dyn Connection, statement: &Statement) -> Result<Rows> {
    tracing::debug!(sql = %statement.sql, parameters = statement.bind_count(), "query");
    conn.query(statement)
        .map_err(|source| Error::execution(statement, source))
}

pub(crate) fn run_execute(conn: &dyn Connection, statement: &Statement) -> Result<ExecuteResult> {
    tracing::debug!(sql = %statement.sql, parameters = statement.bind_count(), "execute");
    conn.execute(statement)
        .map_err(|source| Error::execution(statement, source))
}

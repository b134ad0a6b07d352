//! DELETE by id restriction.
//!
//! Joins only serve the restriction: the statement always deletes from the
//! root table, keyed on ids selected through the join tree. Plain id deletes
//! skip the subquery and chunk their id lists by the parameter ceiling.

use super::options::ExecutionOptions;
use super::run_execute;
use super::select::restriction;
use crate::connection::Connection;
use crate::context::Context;
use crate::error::Result;
use crate::evaluation::Evaluation;
use crate::join::JoinNode;
use crate::mapping::MappingProvider;
use crate::object::Object;
use crate::sql::dml::Delete as DeleteStatement;
use crate::sql::expr::{col, table_col, Expr, ExprExt};
use crate::sql::query::{Query, SelectExpr, TableRef};
use crate::sql::{Dialect, Parameter, SqlDialect, Statement};
use crate::value::Key;

const SUBQUERY_SUFFIX: &str = "_0";
const WRAP_ALIAS: &str = "doomed";
const ID_ALIAS: &str = "id";

/// A DELETE of one entity type.
#[derive(Clone)]
#[must_use = "builders have no effect until executed"]
pub struct Delete<'p> {
    provider: &'p dyn MappingProvider,
    root: Context,
    filters: Vec<Evaluation>,
    joins: Vec<JoinNode>,
    ids: Option<Vec<Key>>,
    unrestricted: bool,
    options: ExecutionOptions,
}

impl<'p> Delete<'p> {
    pub fn new(provider: &'p dyn MappingProvider, entity: &str) -> Result<Self> {
        Ok(Self {
            provider,
            root: Context::root(provider.entity(entity)?),
            filters: Vec::new(),
            joins: Vec::new(),
            ids: None,
            unrestricted: false,
            options: ExecutionOptions::default(),
        })
    }

    pub fn filter(mut self, evaluation: Evaluation) -> Self {
        self.filters.push(evaluation);
        self
    }

    /// Join a relation to restrict through it.
    pub fn join(mut self, node: JoinNode) -> Self {
        self.joins.push(node);
        self
    }

    /// Delete exactly these instances. Instances without an id are skipped.
    pub fn elements<'o>(mut self, elements: impl IntoIterator<Item = &'o Object>) -> Self {
        let ids = self.ids.get_or_insert_with(Vec::new);
        for element in elements {
            match element.id() {
                Some(id) if !ids.contains(&id) => ids.push(id),
                Some(_) => {}
                None => tracing::warn!(entity = %element.entity_name(), "skipping delete of unsaved instance"),
            }
        }
        self
    }

    /// Allow a delete with no restriction at all.
    pub fn unrestricted(mut self) -> Self {
        self.unrestricted = true;
        self
    }

    pub fn options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// [`Delete::statements`] on the dialect named in the options.
    pub fn preview(&self) -> Result<Vec<Statement>> {
        self.statements(self.options.dialect)
    }

    /// Statements this delete runs on `dialect`, empty for a no-op.
    pub fn statements(&self, dialect: Dialect) -> Result<Vec<Statement>> {
        let descriptor = self.root.target();
        let table = DeleteStatement::from(descriptor.table()).schema(descriptor.schema().map(String::from));
        let id_column = col(&descriptor.id_field().column);

        if let Some(ids) = &self.ids {
            if ids.is_empty() {
                tracing::warn!(entity = %descriptor.name(), "delete of an empty element set is a no-op");
                return Ok(Vec::new());
            }
        }

        let sub = self.root.relabel(SUBQUERY_SUFFIX);
        let (joins, condition) = restriction(self.provider, &self.filters, &self.joins, &sub)?;

        let statements = match (condition, &self.ids) {
            (None, None) if !self.unrestricted => {
                tracing::warn!(
                    entity = %descriptor.name(),
                    "delete without restriction is a no-op unless marked unrestricted"
                );
                Vec::new()
            }
            (None, None) => vec![table.to_statement(dialect)],
            (None, Some(ids)) => ids
                .chunks(self.options.in_list_ceiling(dialect))
                .map(|chunk| {
                    table
                        .clone()
                        .filter(id_column.clone().in_list(self.id_params(chunk)))
                        .to_statement(dialect)
                })
                .collect(),
            (Some(condition), ids) => {
                let mut probe = Query::new()
                    .from(sub.table_ref())
                    .joins(joins)
                    .filter(condition);
                if let Some(ids) = ids {
                    probe = probe.filter(sub.id_column().in_list(self.id_params(ids)));
                }
                let probe = if dialect.wrap_self_referencing_subquery() {
                    let inner = probe
                        .select(vec![SelectExpr::new(sub.id_column()).with_alias(ID_ALIAS)])
                        .distinct();
                    Query::new()
                        .select(vec![table_col(WRAP_ALIAS, ID_ALIAS)])
                        .from(TableRef::derived(inner, WRAP_ALIAS))
                } else {
                    probe.select(vec![sub.id_column()])
                };
                vec![table.filter(id_column.in_subquery(probe)).to_statement(dialect)]
            }
        };
        Ok(statements
            .into_iter()
            .map(|s| s.with_timeout(self.options.timeout))
            .collect())
    }

    /// Run the delete, returning the number of rows removed.
    pub fn execute(&self, conn: &dyn Connection) -> Result<u64> {
        let mut affected = 0;
        for statement in self.statements(conn.dialect())? {
            affected += run_execute(conn, &statement)?.affected;
        }
        Ok(affected)
    }

    fn id_params(&self, ids: &[Key]) -> Vec<Expr> {
        let descriptor = self.root.target();
        let id_name = &descriptor.id_field().name;
        ids.iter()
            .map(|id| Expr::Param(Parameter::field(descriptor.name(), id_name, id)))
            .collect()
    }
}

//! Rendering join trees into deduplicated JOIN clauses.

use std::collections::HashMap;

use super::{walk, JoinNode};
use crate::context::{Context, PATH_SEPARATOR};
use crate::error::Result;
use crate::evaluation::Evaluation;
use crate::mapping::{JoinMechanism, JoinSide, MappingProvider};
use crate::sql::expr::{table_col, Expr, ExprExt};
use crate::sql::query::{Join, TableRef};
use crate::sql::Dialect;

/// The JOINs bringing one context into a query, plus the WHERE fragments
/// its node contributes.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    /// Path of the joined context.
    pub key: String,
    pub joins: Vec<Join>,
    /// Bound parameters in the ON restrictions.
    pub on_parameters: usize,
    pub filters: Vec<Expr>,
}

/// Join clauses keyed by context path, in pre-order of first appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinClauseSet {
    clauses: Vec<JoinClause>,
    index: HashMap<String, usize>,
}

impl JoinClauseSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `clause`, merging with an existing clause for the same path.
    ///
    /// The more restrictive ON clause (more bound parameters) wins; WHERE
    /// fragments from both sides are kept.
    pub fn insert(&mut self, clause: JoinClause) {
        let Some(&at) = self.index.get(&clause.key) else {
            self.index.insert(clause.key.clone(), self.clauses.len());
            self.clauses.push(clause);
            return;
        };
        let existing = &mut self.clauses[at];
        if clause.on_parameters > existing.on_parameters {
            existing.joins = clause.joins;
            existing.on_parameters = clause.on_parameters;
        }
        for filter in clause.filters {
            if !existing.filters.contains(&filter) {
                existing.filters.push(filter);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[JoinClause] {
        &self.clauses
    }

    pub fn get(&self, key: &str) -> Option<&JoinClause> {
        self.index.get(key).map(|&i| &self.clauses[i])
    }

    /// All JOINs, in order.
    pub fn joins(&self) -> Vec<Join> {
        self.clauses
            .iter()
            .flat_map(|c| c.joins.iter().cloned())
            .collect()
    }

    /// Accumulated WHERE fragments, in order.
    pub fn filters(&self) -> Vec<Expr> {
        self.clauses
            .iter()
            .flat_map(|c| c.filters.iter().cloned())
            .collect()
    }
}

/// Render `nodes` below `root` as LEFT JOINs.
///
/// Join restrictions (`filters`) are collected only when
/// `include_predicates` is set; ON restrictions are always rendered.
pub fn to_sql_join(
    nodes: &[JoinNode],
    root: &Context,
    provider: &dyn MappingProvider,
    include_predicates: bool,
) -> Result<JoinClauseSet> {
    let mut set = JoinClauseSet::new();
    for step in walk(nodes, root, provider)? {
        let on = render_all(&step.node.on, &step.context, provider)?;
        let on_parameters = on
            .iter()
            .map(|e| e.parameter_count(Dialect::default()))
            .sum();
        let joins = render_joins(&step.parent, &step.context, &step.node.relation.mechanism, on);
        let filters = if include_predicates {
            render_all(&step.node.filters, &step.context, provider)?
        } else {
            Vec::new()
        };
        set.insert(JoinClause {
            key: step.context.path().to_string(),
            joins,
            on_parameters,
            filters,
        });
    }
    Ok(set)
}

fn render_all(
    evaluations: &[Evaluation],
    context: &Context,
    provider: &dyn MappingProvider,
) -> Result<Vec<Expr>> {
    let mut out = Vec::new();
    for evaluation in evaluations {
        if let Some(expr) = evaluation.to_expr(context, provider)? {
            out.push(expr);
        }
    }
    Ok(out)
}

fn render_joins(
    parent: &Context,
    child: &Context,
    mechanism: &JoinMechanism,
    on: Vec<Expr>,
) -> Vec<Join> {
    match mechanism {
        JoinMechanism::JoinColumn {
            column,
            side,
            referenced_column,
            ..
        } => {
            let condition = match side {
                JoinSide::Local => {
                    let referenced = child.target().referenced_column(referenced_column);
                    child.raw_column(referenced).eq(parent.raw_column(column))
                }
                JoinSide::Remote => {
                    let referenced = parent.target().referenced_column(referenced_column);
                    child.raw_column(column).eq(parent.raw_column(referenced))
                }
            };
            vec![Join::left(child.table_ref(), with_restrictions(condition, on))]
        }
        JoinMechanism::JoinTable {
            table,
            schema,
            source_column,
            target_column,
        } => {
            let link = format!("{}{PATH_SEPARATOR}{table}", child.path());
            let link_ref = TableRef::new(table)
                .with_schema(schema.as_deref())
                .with_alias(&link);
            let to_link = table_col(&link, source_column).eq(parent.id_column());
            let to_target = child
                .id_column()
                .eq(table_col(&link, target_column));
            vec![
                Join::left(link_ref, to_link),
                Join::left(child.table_ref(), with_restrictions(to_target, on)),
            ]
        }
    }
}

fn with_restrictions(condition: Expr, on: Vec<Expr>) -> Expr {
    on.into_iter().fold(condition, |acc, e| acc.and(e))
}

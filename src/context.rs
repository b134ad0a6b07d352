//! Query contexts: named positions in the object graph.
//!
//! A context is the root entity of a query, or the entity reached from a
//! parent context through one relation. Its path doubles as the SQL alias of
//! that position, so two contexts naming the same position render the same
//! alias and compare equal however they were built. Dialects with short
//! identifier limits render a shortened form of the alias; the path stays
//! the equality key.
//!
//! ```text
//! Author                 root
//! Author$books$Book      Author --books--> Book
//! Author$books$Book_0   same positions relabeled for a correlated subquery
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{Error, MappingError, Result};
use crate::mapping::{EntityDescriptor, FieldHandle, MappingProvider};
use crate::sql::expr::{table_col, Expr};
use crate::sql::query::TableRef;

/// Separates relation and type names in a path.
pub const PATH_SEPARATOR: char = '$';

struct ContextNode {
    target: Arc<EntityDescriptor>,
    parent: Option<Context>,
    relation: Option<String>,
    suffix: String,
    /// Path without the suffix; children extend this.
    base: String,
    path: String,
}

/// Immutable, cheaply cloned position in a query's join tree.
#[derive(Clone)]
pub struct Context(Arc<ContextNode>);

impl Context {
    pub fn root(target: Arc<EntityDescriptor>) -> Self {
        Self::root_with_suffix(target, "")
    }

    /// A root whose path (and every descendant's) carries `suffix`.
    pub fn root_with_suffix(target: Arc<EntityDescriptor>, suffix: &str) -> Self {
        let base = target.name().to_string();
        Self::node(target, None, None, suffix, base)
    }

    fn node(
        target: Arc<EntityDescriptor>,
        parent: Option<Context>,
        relation: Option<String>,
        suffix: &str,
        base: String,
    ) -> Self {
        let path = format!("{base}{suffix}");
        Self(Arc::new(ContextNode {
            target,
            parent,
            relation,
            suffix: suffix.into(),
            base,
            path,
        }))
    }

    /// Child context reached through `relation`, landing on `target`.
    pub fn to(&self, target: Arc<EntityDescriptor>, relation: &str) -> Self {
        let base = format!(
            "{}{sep}{relation}{sep}{}",
            self.0.base,
            target.name(),
            sep = PATH_SEPARATOR
        );
        Self::node(target, Some(self.clone()), Some(relation.into()), &self.0.suffix, base)
    }

    /// Child context through the relation named `relation` of this target.
    pub fn descend(&self, provider: &dyn MappingProvider, relation: &str) -> Result<Self> {
        let descriptor = self.target().require_relation(relation)?;
        let target = provider.entity(&descriptor.target)?;
        Ok(self.to(target, relation))
    }

    /// The same chain of positions with every path carrying `suffix`.
    pub fn relabel(&self, suffix: &str) -> Self {
        match &self.0.parent {
            None => Self::root_with_suffix(Arc::clone(&self.0.target), suffix),
            Some(parent) => {
                let relation = self.0.relation.as_deref().unwrap_or_default();
                parent
                    .relabel(suffix)
                    .to(Arc::clone(&self.0.target), relation)
            }
        }
    }

    pub fn path(&self) -> &str {
        &self.0.path
    }

    /// SQL alias of this position. Identical to the path; rendering shortens
    /// it past the dialect's identifier limit.
    pub fn alias(&self) -> &str {
        &self.0.path
    }

    pub fn target(&self) -> &Arc<EntityDescriptor> {
        &self.0.target
    }

    pub fn parent(&self) -> Option<&Context> {
        self.0.parent.as_ref()
    }

    /// Relation name this context was reached through.
    pub fn relation(&self) -> Option<&str> {
        self.0.relation.as_deref()
    }

    pub fn suffix(&self) -> &str {
        &self.0.suffix
    }

    pub fn is_root(&self) -> bool {
        self.0.parent.is_none()
    }

    pub fn root_context(&self) -> Context {
        let mut current = self.clone();
        while let Some(parent) = current.parent().cloned() {
            current = parent;
        }
        current
    }

    /// Qualified column of `field` on this context's alias.
    pub fn column(&self, field: &str) -> std::result::Result<Expr, MappingError> {
        let handle = self.0.target.require_field(field)?;
        Ok(self.column_at(handle))
    }

    pub fn column_at(&self, handle: FieldHandle) -> Expr {
        self.raw_column(&self.0.target.field_at(handle).column)
    }

    pub fn id_column(&self) -> Expr {
        self.column_at(self.0.target.id_handle())
    }

    /// Column by database name, for join columns that are not mapped fields.
    pub fn raw_column(&self, column: &str) -> Expr {
        table_col(&self.0.path, column)
    }

    /// `table AS alias` for FROM and JOIN items.
    pub fn table_ref(&self) -> TableRef {
        TableRef::new(self.0.target.table())
            .with_schema(self.0.target.schema())
            .with_alias(&self.0.path)
    }

    /// Fail unless this context's root targets `entity`.
    pub(crate) fn require_root(&self, entity: &str) -> Result<()> {
        let root = self.root_context();
        if root.target().name() != entity {
            return Err(Error::InvalidQuery(format!(
                "path rooted at `{entity}` used in a query on `{}`",
                root.target().name()
            )));
        }
        Ok(())
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.0.path == other.0.path
    }
}

impl Eq for Context {}

impl Hash for Context {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.path.hash(state);
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.path)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Context({})", self.0.path)
    }
}

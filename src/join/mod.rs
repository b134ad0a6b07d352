//! Join graph: trees of relations to traverse from a query root.
//!
//! A [`JoinNode`] names one relation and may restrict its target, either in
//! the WHERE clause (`filters`, restricting which roots match) or in the ON
//! clause (`on`, restricting which related rows are loaded). Trees are built
//! by hand or generated by [`join_all`] / [`join_profiles`], which follow
//! every eligible relation and prune a branch when a relation repeats along
//! its own path.

mod clause;

pub use clause::{to_sql_join, JoinClause, JoinClauseSet};

use std::sync::Arc;

use crate::context::Context;
use crate::error::{Error, JoinCycleError, MappingError, Result};
use crate::evaluation::Evaluation;
use crate::mapping::{MappingProvider, RelationDescriptor};

/// One relation in a join tree, with its restrictions and nested joins.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct JoinNode {
    pub relation: Arc<RelationDescriptor>,
    pub filters: Vec<Evaluation>,
    pub on: Vec<Evaluation>,
    pub children: Vec<JoinNode>,
}

impl JoinNode {
    /// Join `relation` of entity type `source`.
    pub fn new(provider: &dyn MappingProvider, source: &str, relation: &str) -> Result<Self> {
        let descriptor = provider.entity(source)?;
        let relation = descriptor.require_relation(relation)?;
        Ok(Self::from_relation(Arc::clone(relation)))
    }

    pub fn from_relation(relation: Arc<RelationDescriptor>) -> Self {
        Self {
            relation,
            filters: Vec::new(),
            on: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Restrict the query's roots to those whose related rows match.
    pub fn filter(mut self, evaluation: Evaluation) -> Self {
        self.filters.push(evaluation);
        self
    }

    /// Restrict which related rows are joined (and loaded).
    pub fn on(mut self, evaluation: Evaluation) -> Self {
        self.on.push(evaluation);
        self
    }

    pub fn child(mut self, node: JoinNode) -> Self {
        self.children.push(node);
        self
    }

    /// Entity type this join lands on.
    pub fn target(&self) -> &str {
        &self.relation.target
    }

    /// Nodes in this subtree, itself included.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(JoinNode::size).sum::<usize>()
    }

    /// Whether this subtree restricts the root row set.
    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty() || self.children.iter().any(JoinNode::has_filters)
    }
}

/// A join node placed at its context in the tree.
#[derive(Debug, Clone)]
pub struct JoinStep<'a> {
    pub node: &'a JoinNode,
    pub parent: Context,
    pub context: Context,
}

/// Pre-order placement of `nodes` below `root`.
pub fn walk<'a>(
    nodes: &'a [JoinNode],
    root: &Context,
    provider: &dyn MappingProvider,
) -> Result<Vec<JoinStep<'a>>> {
    let mut out = Vec::new();
    walk_into(nodes, root, provider, &mut out)?;
    Ok(out)
}

fn walk_into<'a>(
    nodes: &'a [JoinNode],
    parent: &Context,
    provider: &dyn MappingProvider,
    out: &mut Vec<JoinStep<'a>>,
) -> Result<()> {
    for node in nodes {
        if node.relation.source != parent.target().name() {
            return Err(Error::InvalidQuery(format!(
                "relation `{}` joined below `{}`",
                node.relation.qualified_name(),
                parent.target().name()
            )));
        }
        let context = parent.to(provider.entity(&node.relation.target)?, &node.relation.name);
        out.push(JoinStep {
            node,
            parent: parent.clone(),
            context: context.clone(),
        });
        walk_into(&node.children, &context, provider, out)?;
    }
    Ok(())
}

// ============================================================================
// Auto-join
// ============================================================================

/// Join every auto-joinable relation reachable from `entity`.
pub fn join_all(provider: &dyn MappingProvider, entity: &str) -> Result<Vec<JoinNode>> {
    Ok(provider.auto_joins(entity, None)?.as_ref().clone())
}

/// Join every relation tagged with one of `profiles` reachable from `entity`.
pub fn join_profiles(
    provider: &dyn MappingProvider,
    entity: &str,
    profiles: &[&str],
) -> Result<Vec<JoinNode>> {
    let profiles: Vec<String> = profiles.iter().map(|p| p.to_string()).collect();
    Ok(provider.auto_joins(entity, Some(&profiles))?.as_ref().clone())
}

/// Build an auto-join tree without memoization.
pub(crate) fn build_auto_joins<P: MappingProvider + ?Sized>(
    provider: &P,
    entity: &str,
    profiles: Option<&[String]>,
) -> std::result::Result<Vec<JoinNode>, MappingError> {
    let mut path = Vec::new();
    expand(provider, entity, profiles, &mut path)
}

fn expand<P: MappingProvider + ?Sized>(
    provider: &P,
    entity: &str,
    profiles: Option<&[String]>,
    path: &mut Vec<String>,
) -> std::result::Result<Vec<JoinNode>, MappingError> {
    let mut nodes = Vec::new();
    for relation in provider.relations_from(entity)? {
        let eligible = match profiles {
            None => relation.auto_join,
            Some(profiles) => relation.in_profiles(profiles),
        };
        if !eligible {
            continue;
        }
        if let Err(cycle) = enter(path, &relation) {
            tracing::trace!("pruning auto-join branch: {cycle}");
            continue;
        }
        let children = expand(provider, &relation.target, profiles, path)?;
        path.pop();

        let mut node = JoinNode::from_relation(relation);
        node.children = children;
        nodes.push(node);
    }
    Ok(nodes)
}

/// Push `relation` onto the traversal path unless it is already on it.
fn enter(path: &mut Vec<String>, relation: &RelationDescriptor) -> std::result::Result<(), JoinCycleError> {
    let name = relation.qualified_name();
    if path.contains(&name) {
        return Err(JoinCycleError {
            relation: name,
            path: path.clone(),
        });
    }
    path.push(name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{EntityDescriptor, FieldKind, IdGeneration, JoinSide, Registry};

    fn entity(name: &str) -> crate::mapping::EntityBuilder {
        EntityDescriptor::builder(name).id("id", FieldKind::Int, IdGeneration::Assigned)
    }

    fn library() -> Registry {
        Registry::builder()
            .entity(
                entity("Author")
                    .relation(
                        RelationDescriptor::many("books", "Book")
                            .join_column("author_id", JoinSide::Remote)
                            .profile("detail"),
                    )
                    .build()
                    .unwrap(),
            )
            .entity(
                entity("Book")
                    .relation(
                        RelationDescriptor::one("author", "Author").join_column("author_id", JoinSide::Local),
                    )
                    .relation(
                        RelationDescriptor::many("tags", "Tag")
                            .join_table("book_tag", "book_id", "tag_id")
                            .profile("detail"),
                    )
                    .relation(
                        RelationDescriptor::many("reviews", "Review")
                            .join_column("book_id", JoinSide::Remote)
                            .no_auto_join(),
                    )
                    .build()
                    .unwrap(),
            )
            .entity(entity("Tag").build().unwrap())
            .entity(entity("Review").build().unwrap())
            .build()
            .unwrap()
    }

    fn names(nodes: &[JoinNode], prefix: &str, out: &mut Vec<String>) {
        for n in nodes {
            let name = format!("{prefix}{}", n.relation.name);
            out.push(name.clone());
            names(&n.children, &format!("{name}."), out);
        }
    }

    #[test]
    fn test_join_all_prunes_cycles() {
        let reg = library();
        let tree = join_all(&reg, "Author").unwrap();
        let mut out = Vec::new();
        names(&tree, "", &mut out);
        // Author.books repeats below Book.author, so that branch stops there.
        assert_eq!(out, vec!["books", "books.author", "books.tags"]);
    }

    #[test]
    fn test_join_profiles() {
        let reg = library();
        let tree = join_profiles(&reg, "Author", &["detail"]).unwrap();
        let mut out = Vec::new();
        names(&tree, "", &mut out);
        assert_eq!(out, vec!["books", "books.tags"]);
    }

    #[test]
    fn test_enter_reports_cycle() {
        let reg = library();
        let relation = Arc::clone(reg.entity("Book").unwrap().relation("author").unwrap());
        let mut path = vec!["Author.books".to_string(), "Book.author".to_string()];
        let err = enter(&mut path, &relation).unwrap_err();
        assert_eq!(err.relation, "Book.author");
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn test_walk_rejects_misplaced_node() {
        let reg = library();
        let root = Context::root(reg.entity("Author").unwrap());
        let tags = JoinNode::new(&reg, "Book", "tags").unwrap();
        let err = walk(std::slice::from_ref(&tags), &root, &reg).unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }

    #[test]
    fn test_walk_is_pre_order() {
        let reg = library();
        let root = Context::root(reg.entity("Author").unwrap());
        let tree = vec![JoinNode::new(&reg, "Author", "books")
            .unwrap()
            .child(JoinNode::new(&reg, "Book", "tags").unwrap())
            .child(JoinNode::new(&reg, "Book", "reviews").unwrap())];
        let steps = walk(&tree, &root, &reg).unwrap();
        let paths: Vec<_> = steps.iter().map(|s| s.context.path().to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "Author$books$Book",
                "Author$books$Book$tags$Tag",
                "Author$books$Book$reviews$Review",
            ]
        );
        assert_eq!(tree[0].size(), 3);
    }
}

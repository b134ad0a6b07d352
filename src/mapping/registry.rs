//! Statically registered mapping provider.
//!
//! The registry owns every entity descriptor, validates cross-entity
//! references once at build time, and memoizes derived data:
//! - auto-join trees per (type, profiles), in a `DashMap`
//! - the schema graph (entity nodes, relation edges), built on first use

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef};

use super::descriptor::{EntityDescriptor, JoinMechanism, JoinSide, RelationDescriptor};
use super::MappingProvider;
use crate::error::MappingError;
use crate::join::{self, JoinNode};

type AutoJoinKey = (String, Option<Vec<String>>);

/// Entity table plus memoized derived metadata. Safe for concurrent reads.
#[derive(Debug)]
pub struct Registry {
    entities: HashMap<String, Arc<EntityDescriptor>>,
    order: Vec<String>,
    graph: OnceCell<SchemaGraph>,
    auto_joins: DashMap<AutoJoinKey, Arc<Vec<JoinNode>>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Relation graph over all registered entities.
    pub fn schema_graph(&self) -> &SchemaGraph {
        self.graph.get_or_init(|| {
            SchemaGraph::build(self.order.iter().filter_map(|n| self.entities.get(n)))
        })
    }

    /// Number of memoized auto-join trees.
    pub fn memoized_join_trees(&self) -> usize {
        self.auto_joins.len()
    }
}

impl MappingProvider for Registry {
    fn entity(&self, name: &str) -> Result<Arc<EntityDescriptor>, MappingError> {
        self.entities
            .get(name)
            .cloned()
            .ok_or_else(|| MappingError::UnknownEntity(name.into()))
    }

    fn entity_names(&self) -> Vec<String> {
        self.order.clone()
    }

    fn relations_from(&self, entity: &str) -> Result<Vec<Arc<RelationDescriptor>>, MappingError> {
        if !self.entities.contains_key(entity) {
            return Err(MappingError::UnknownEntity(entity.into()));
        }
        Ok(self.schema_graph().relations_from(entity))
    }

    fn auto_joins(
        &self,
        entity: &str,
        profiles: Option<&[String]>,
    ) -> Result<Arc<Vec<JoinNode>>, MappingError> {
        let key = (entity.to_string(), profiles.map(<[String]>::to_vec));
        if let Some(tree) = self.auto_joins.get(&key) {
            return Ok(Arc::clone(tree.value()));
        }
        let tree = Arc::new(join::build_auto_joins(self, entity, profiles)?);
        // A concurrent builder may have won; either tree is equivalent.
        Ok(Arc::clone(self.auto_joins.entry(key).or_insert(tree).value()))
    }
}

/// Collects descriptors and validates them into a [`Registry`].
#[derive(Debug, Default)]
#[must_use = "builders have no effect until used"]
pub struct RegistryBuilder {
    entities: Vec<EntityDescriptor>,
}

impl RegistryBuilder {
    pub fn entity(mut self, descriptor: EntityDescriptor) -> Self {
        self.entities.push(descriptor);
        self
    }

    pub fn build(self) -> Result<Registry, MappingError> {
        let mut entities = HashMap::new();
        let mut order = Vec::new();
        for descriptor in self.entities {
            let name = descriptor.name().to_string();
            if entities.contains_key(&name) {
                return Err(MappingError::DuplicateEntity(name));
            }
            order.push(name.clone());
            entities.insert(name, Arc::new(descriptor));
        }

        for descriptor in entities.values() {
            for relation in descriptor.relations() {
                validate_relation(descriptor, relation, &entities)?;
            }
        }

        Ok(Registry {
            entities,
            order,
            graph: OnceCell::new(),
            auto_joins: DashMap::new(),
        })
    }
}

fn validate_relation(
    source: &EntityDescriptor,
    relation: &RelationDescriptor,
    entities: &HashMap<String, Arc<EntityDescriptor>>,
) -> Result<(), MappingError> {
    let target = entities
        .get(&relation.target)
        .ok_or_else(|| MappingError::UnknownEntity(relation.target.clone()))?;

    if let JoinMechanism::JoinColumn {
        side,
        referenced_column: Some(column),
        ..
    } = &relation.mechanism
    {
        // The FK points at the entity on the far side of the column.
        let referenced = match side {
            JoinSide::Local => target,
            JoinSide::Remote => source,
        };
        if referenced.field_by_column(column).is_none() {
            return Err(MappingError::UnknownColumn {
                entity: referenced.name().into(),
                column: column.clone(),
            });
        }
    }
    Ok(())
}

// ============================================================================
// Schema graph
// ============================================================================

/// Directed graph of entity types; one edge per relation, weighted by
/// declaration ordinal so traversal order is stable.
#[derive(Debug)]
pub struct SchemaGraph {
    graph: DiGraph<String, (usize, Arc<RelationDescriptor>)>,
    nodes: HashMap<String, NodeIndex>,
}

impl SchemaGraph {
    fn build<'a>(entities: impl Iterator<Item = &'a Arc<EntityDescriptor>> + Clone) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();
        for entity in entities.clone() {
            let idx = graph.add_node(entity.name().to_string());
            nodes.insert(entity.name().to_string(), idx);
        }
        for entity in entities {
            let from = nodes[entity.name()];
            for (ordinal, relation) in entity.relations().iter().enumerate() {
                if let Some(&to) = nodes.get(&relation.target) {
                    graph.add_edge(from, to, (ordinal, Arc::clone(relation)));
                }
            }
        }
        Self { graph, nodes }
    }

    /// Relations leaving `entity`, in declaration order.
    pub fn relations_from(&self, entity: &str) -> Vec<Arc<RelationDescriptor>> {
        let Some(&idx) = self.nodes.get(entity) else {
            return Vec::new();
        };
        let mut edges: Vec<_> = self.graph.edges(idx).map(|e| e.weight()).collect();
        edges.sort_by_key(|(ordinal, _)| *ordinal);
        edges.into_iter().map(|(_, r)| Arc::clone(r)).collect()
    }

    /// Entity types reachable from `entity` through any relation, itself included.
    pub fn reachable(&self, entity: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let Some(&start) = self.nodes.get(entity) else {
            return out;
        };
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(idx) = dfs.next(&self.graph) {
            out.insert(self.graph[idx].clone());
        }
        out
    }

    /// Groups of entity types that reach each other through relations.
    ///
    /// A single type only counts when it relates to itself.
    pub fn cycles(&self) -> Vec<BTreeSet<String>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || self.graph.edges_connecting(scc[0], scc[0]).next().is_some()
            })
            .map(|scc| scc.into_iter().map(|idx| self.graph[idx].clone()).collect())
            .collect()
    }

    pub fn is_cyclic(&self, entity: &str) -> bool {
        self.cycles().iter().any(|c| c.contains(entity))
    }
}

//! Recursive hydration: loading relations of existing instances in waves.
//!
//! A hydrate starts from seed instances that already have ids and a set of
//! join directives. Each directive applies to instances of its relation's
//! source type. One wave runs a select per seed type restricted to the seed
//! ids, which fills the seeds' relation slots through the shared cache.
//! With `recurse`, every instance fetched through the directives and not
//! yet visited seeds the next wave; the traversal ends when a wave finds
//! nothing new, so cyclic relation graphs terminate after visiting each
//! reachable instance once.
//!
//! Only relation slots change on the caller's seeds. Their field values are
//! put back after the traversal, so unsaved edits survive.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::options::ExecutionOptions;
use super::select::Select;
use crate::cache::FirstLevelCache;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::evaluation::Evaluation;
use crate::join::JoinNode;
use crate::mapping::MappingProvider;
use crate::object::{EntityRef, Object};
use crate::value::{Key, Value};

/// What a hydrate visited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HydrateReport {
    /// Waves run, counting the seed wave.
    pub waves: usize,
    /// Every instance whose relations were loaded.
    pub done: BTreeSet<EntityRef>,
    pub statements: usize,
}

/// Loads joined relations onto existing instances, optionally recursively.
#[must_use = "builders have no effect until executed"]
pub struct Hydrate<'p> {
    provider: &'p dyn MappingProvider,
    seeds: Vec<Object>,
    joins: Vec<JoinNode>,
    recurse: bool,
    options: ExecutionOptions,
}

impl<'p> Hydrate<'p> {
    pub fn new(provider: &'p dyn MappingProvider) -> Self {
        Self {
            provider,
            seeds: Vec::new(),
            joins: Vec::new(),
            recurse: false,
            options: ExecutionOptions::default(),
        }
    }

    pub fn element(mut self, element: &Object) -> Self {
        self.seeds.push(element.clone());
        self
    }

    pub fn elements<'o>(mut self, elements: impl IntoIterator<Item = &'o Object>) -> Self {
        self.seeds.extend(elements.into_iter().cloned());
        self
    }

    /// Load `node` onto every visited instance of its source type.
    pub fn join(mut self, node: JoinNode) -> Self {
        self.joins.push(node);
        self
    }

    /// Keep hydrating newly reached instances until none are left.
    pub fn recurse(mut self) -> Self {
        self.recurse = true;
        self
    }

    pub fn options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn execute(&self, conn: &dyn Connection) -> Result<HydrateReport> {
        let mut cache = FirstLevelCache::new();
        self.execute_with(conn, &mut cache)
    }

    /// Execute with a caller-owned cache, so instances reached here are the
    /// ones the caller already holds.
    pub fn execute_with(&self, conn: &dyn Connection, cache: &mut FirstLevelCache) -> Result<HydrateReport> {
        if self.seeds.is_empty() {
            tracing::warn!("hydrate of an empty element set is a no-op");
            return Ok(HydrateReport::default());
        }
        let held: Vec<(Object, Vec<Value>)> = self.seeds.iter().map(|s| (s.clone(), s.values())).collect();
        let result = self.traverse(conn, cache);
        for (seed, values) in held {
            seed.restore_values(values);
        }
        result
    }

    fn traverse(&self, conn: &dyn Connection, cache: &mut FirstLevelCache) -> Result<HydrateReport> {
        let mut report = HydrateReport::default();
        let mut wave: BTreeMap<String, Vec<Object>> = BTreeMap::new();
        for seed in &self.seeds {
            let key = seed.entity_ref().ok_or_else(|| {
                Error::InvalidQuery(format!("cannot hydrate an unsaved `{}` instance", seed.entity_name()))
            })?;
            if report.done.insert(key) {
                wave.entry(seed.entity_name()).or_default().push(seed.clone());
            }
        }

        while !wave.is_empty() {
            report.waves += 1;
            if report.waves == self.options.hydration_warn_waves {
                tracing::warn!(
                    waves = report.waves,
                    visited = report.done.len(),
                    "hydration is still finding new instances"
                );
            }

            let mut reached = Vec::new();
            for (entity, seeds) in &wave {
                let nodes: Vec<&JoinNode> = self.joins.iter().filter(|n| &n.relation.source == entity).collect();
                if nodes.is_empty() {
                    continue;
                }
                self.load(conn, cache, entity, seeds, &nodes, &mut report, &mut reached)?;
            }
            if !self.recurse {
                break;
            }

            wave = BTreeMap::new();
            for object in reached {
                if let Some(key) = object.entity_ref() {
                    if report.done.insert(key) {
                        wave.entry(object.entity_name()).or_default().push(object);
                    }
                }
            }
            tracing::trace!(
                wave = report.waves,
                next = wave.values().map(Vec::len).sum::<usize>(),
                "hydration wave finished"
            );
        }
        Ok(report)
    }

    /// Load `nodes` onto `seeds` of type `entity`, collecting every
    /// instance the directives reached into `reached`.
    #[allow(clippy::too_many_arguments)]
    fn load(
        &self,
        conn: &dyn Connection,
        cache: &mut FirstLevelCache,
        entity: &str,
        seeds: &[Object],
        nodes: &[&JoinNode],
        report: &mut HydrateReport,
        reached: &mut Vec<Object>,
    ) -> Result<()> {
        let ceiling = self.options.in_list_ceiling(conn.dialect());
        if seeds.len() > ceiling {
            tracing::warn!(
                entity,
                seeds = seeds.len(),
                ceiling,
                "seed ids exceed the parameter ceiling; batching"
            );
        }

        // The seeds themselves are the instances the select fills in.
        let held: Vec<(Object, Object)> = seeds.iter().map(|s| (s.clone(), cache.adopt(s))).collect();

        for chunk in held.chunks(ceiling) {
            let ids: Vec<Key> = chunk.iter().filter_map(|(s, _)| s.id()).collect();
            let mut select = Select::new(self.provider, entity)?
                .filter(Evaluation::id_in(ids))
                .options(self.options.clone());
            for node in nodes {
                select = select.join((*node).clone());
            }
            let (_, statements) = select.run(conn, cache)?;
            report.statements += statements;

            for (seed, cached) in chunk {
                let descriptor = seed.descriptor();
                for node in nodes {
                    let Some(slot) = descriptor.relation_index(&node.relation.name) else {
                        continue;
                    };
                    seed.copy_relation(slot, cached);
                    collect(cached, node, slot, reached);
                }
            }
        }
        Ok(())
    }
}

/// Instances reachable from `object` through `node` and its children.
fn collect(object: &Object, node: &JoinNode, slot: usize, out: &mut Vec<Object>) {
    let mut seen = HashSet::new();
    let mut frontier: Vec<(Object, &JoinNode, usize)> = vec![(object.clone(), node, slot)];
    while let Some((owner, node, slot)) = frontier.pop() {
        for related in owner.related_at(slot).objects() {
            if !seen.insert((related.addr(), node.relation.qualified_name())) {
                continue;
            }
            let descriptor = related.descriptor();
            for child in &node.children {
                if let Some(child_slot) = descriptor.relation_index(&child.relation.name) {
                    frontier.push((related.clone(), child, child_slot));
                }
            }
            out.push(related);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SqliteConnection;
    use crate::mapping::{EntityDescriptor, FieldKind, IdGeneration, Registry};

    #[test]
    fn test_unsaved_seed_is_rejected() {
        let reg = Registry::builder()
            .entity(
                EntityDescriptor::builder("Tag")
                    .id("id", FieldKind::Int, IdGeneration::Identity)
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        let conn = SqliteConnection::open_in_memory().unwrap();
        let unsaved = Object::new(reg.entity("Tag").unwrap());
        let err = Hydrate::new(&reg).element(&unsaved).execute(&conn).unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }

    #[test]
    fn test_empty_seed_set_is_noop() {
        let reg = Registry::builder().build().unwrap();
        let conn = SqliteConnection::open_in_memory().unwrap();
        let report = Hydrate::new(&reg).recurse().execute(&conn).unwrap();
        assert_eq!(report, HydrateReport::default());
    }
}

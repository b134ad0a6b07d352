//! First-level cache: one in-memory instance per entity per operation.
//!
//! A cache lives for one `Select`, `Hydrate` or `Upsert`, or is passed
//! explicitly through a chain of them with the `execute_with` entry points.
//! It holds [`Object`]s and so is confined to the thread running the
//! operation.

use std::collections::HashMap;
use std::sync::Arc;

use crate::mapping::EntityDescriptor;
use crate::object::{EntityRef, Object};
use crate::value::Key;

/// Identity map from [`EntityRef`] to instance.
#[derive(Debug, Default)]
pub struct FirstLevelCache {
    entries: HashMap<EntityRef, Object>,
}

impl FirstLevelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached instance for (`descriptor`, `id`), allocating a blank one
    /// with the id set if there is none. The flag is `true` for new instances.
    pub fn get_or_allocate(&mut self, descriptor: &Arc<EntityDescriptor>, id: Key) -> (Object, bool) {
        let key = EntityRef {
            entity: descriptor.name().to_string(),
            id,
        };
        if let Some(existing) = self.entries.get(&key) {
            return (existing.clone(), false);
        }
        let object = Object::with_id(Arc::clone(descriptor), key.id.clone());
        self.entries.insert(key, object.clone());
        (object, true)
    }

    pub fn get(&self, key: &EntityRef) -> Option<Object> {
        self.entries.get(key).cloned()
    }

    pub fn contains(&self, key: &EntityRef) -> bool {
        self.entries.contains_key(key)
    }

    /// Register a caller-owned instance. An instance already cached under the
    /// same ref wins and is returned instead.
    ///
    /// Objects without an id are returned unchanged and not cached.
    pub fn adopt(&mut self, object: &Object) -> Object {
        let Some(key) = object.entity_ref() else {
            return object.clone();
        };
        self.entries.entry(key).or_insert_with(|| object.clone()).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached instances of `entity`, in key order.
    pub fn instances_of(&self, entity: &str) -> Vec<Object> {
        let mut refs: Vec<_> = self.entries.keys().filter(|r| r.entity == entity).collect();
        refs.sort();
        refs.into_iter().map(|r| self.entries[r].clone()).collect()
    }
}

//! Entity instances.
//!
//! An [`Object`] is a shared, interior-mutable handle to one entity
//! instance. Clones share storage; [`Object::same`] compares identity.
//! Field values are stored positionally and addressed by [`FieldHandle`];
//! relation slots are stored in the descriptor's relation order.
//!
//! Objects are deliberately `!Send`: an object graph belongs to the thread
//! that runs the operation producing it. Graphs with cycles (A -> B -> A)
//! hold reference cycles and are only freed after
//! [`Object::clear_relations`] is called on a member of the cycle.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::AccessError;
use crate::mapping::{Cardinality, EntityDescriptor, FieldHandle};
use crate::value::{Key, Value};

/// Logical identity of an entity instance: (type, primary key).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityRef {
    pub entity: String,
    pub id: Key,
}

impl EntityRef {
    pub fn new(entity: impl Into<String>, id: impl Into<Key>) -> Self {
        Self {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity, self.id)
    }
}

/// Contents of one relation slot.
#[derive(Debug, Clone, Default)]
pub enum Related {
    /// Never fetched or assigned. Upsert leaves unloaded relations alone.
    #[default]
    Unloaded,
    One(Option<Object>),
    Many(Vec<Object>),
}

impl Related {
    pub fn is_loaded(&self) -> bool {
        !matches!(self, Related::Unloaded)
    }

    /// Objects held by this slot, in order.
    pub fn objects(&self) -> Vec<Object> {
        match self {
            Related::Unloaded | Related::One(None) => Vec::new(),
            Related::One(Some(o)) => vec![o.clone()],
            Related::Many(v) => v.clone(),
        }
    }
}

struct ObjectData {
    descriptor: Arc<EntityDescriptor>,
    values: Vec<Value>,
    relations: Vec<Related>,
}

/// Shared handle to an entity instance.
#[derive(Clone)]
pub struct Object(Rc<RefCell<ObjectData>>);

impl Object {
    /// A blank instance: every field null, every relation unloaded.
    pub fn new(descriptor: Arc<EntityDescriptor>) -> Self {
        let values = vec![Value::Null; descriptor.fields().len()];
        let relations = vec![Related::Unloaded; descriptor.relations().len()];
        Self(Rc::new(RefCell::new(ObjectData {
            descriptor,
            values,
            relations,
        })))
    }

    /// A blank instance with `id` assigned.
    pub fn with_id(descriptor: Arc<EntityDescriptor>, id: impl Into<Key>) -> Self {
        let object = Self::new(descriptor);
        object.set_id(id.into());
        object
    }

    pub fn descriptor(&self) -> Arc<EntityDescriptor> {
        Arc::clone(&self.0.borrow().descriptor)
    }

    pub fn entity_name(&self) -> String {
        self.0.borrow().descriptor.name().to_string()
    }

    /// Whether both handles point at the same instance.
    pub fn same(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Stable address of the instance, for identity sets.
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    // ------------------------------------------------------------------
    // Fields
    // ------------------------------------------------------------------

    pub fn get(&self, field: &str) -> Result<Value, AccessError> {
        let handle = self.field_handle(field)?;
        Ok(self.get_at(handle))
    }

    pub fn get_at(&self, handle: FieldHandle) -> Value {
        self.0.borrow().values[handle.index()].clone()
    }

    /// Assign a field by name, converting to the field's kind.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<(), AccessError> {
        let handle = self.field_handle(field)?;
        let value = value.into();
        let kind = self.0.borrow().descriptor.field_at(handle).kind;
        let actual = value.kind_name();
        let coerced = kind
            .coerce(value)
            .ok_or_else(|| AccessError::TypeMismatch {
                entity: self.entity_name(),
                field: field.into(),
                expected: kind.name(),
                actual,
            })?;
        self.set_at(handle, coerced);
        Ok(())
    }

    pub fn set_at(&self, handle: FieldHandle, value: Value) {
        self.0.borrow_mut().values[handle.index()] = value;
    }

    /// Every field value, in descriptor order.
    pub(crate) fn values(&self) -> Vec<Value> {
        self.0.borrow().values.clone()
    }

    pub(crate) fn restore_values(&self, values: Vec<Value>) {
        self.0.borrow_mut().values = values;
    }

    /// Primary key, if assigned.
    pub fn id(&self) -> Option<Key> {
        let data = self.0.borrow();
        data.values[data.descriptor.id_handle().index()].as_key()
    }

    pub fn set_id(&self, id: Key) {
        let handle = self.0.borrow().descriptor.id_handle();
        self.set_at(handle, id.into());
    }

    pub fn entity_ref(&self) -> Option<EntityRef> {
        self.id().map(|id| EntityRef {
            entity: self.entity_name(),
            id,
        })
    }

    fn field_handle(&self, field: &str) -> Result<FieldHandle, AccessError> {
        let data = self.0.borrow();
        data.descriptor
            .field_handle(field)
            .ok_or_else(|| AccessError::UnknownField {
                entity: data.descriptor.name().into(),
                field: field.into(),
            })
    }

    // ------------------------------------------------------------------
    // Relations
    // ------------------------------------------------------------------

    fn relation_index(&self, relation: &str) -> Result<usize, AccessError> {
        let data = self.0.borrow();
        data.descriptor
            .relation_index(relation)
            .ok_or_else(|| AccessError::UnknownRelation {
                entity: data.descriptor.name().into(),
                relation: relation.into(),
            })
    }

    pub fn related(&self, relation: &str) -> Result<Related, AccessError> {
        let index = self.relation_index(relation)?;
        Ok(self.related_at(index))
    }

    pub fn related_at(&self, index: usize) -> Related {
        self.0.borrow().relations[index].clone()
    }

    /// The to-one relation `relation`; `None` when empty or unloaded.
    pub fn one(&self, relation: &str) -> Result<Option<Object>, AccessError> {
        self.expect_cardinality(relation, Cardinality::One)?;
        Ok(match self.related(relation)? {
            Related::One(o) => o,
            _ => None,
        })
    }

    /// The to-many relation `relation`; empty when unloaded.
    pub fn many(&self, relation: &str) -> Result<Vec<Object>, AccessError> {
        self.expect_cardinality(relation, Cardinality::Many)?;
        Ok(self.related(relation)?.objects())
    }

    pub fn set_one(&self, relation: &str, object: Option<Object>) -> Result<(), AccessError> {
        let index = self.expect_cardinality(relation, Cardinality::One)?;
        if let Some(o) = &object {
            self.check_target(index, o)?;
        }
        self.0.borrow_mut().relations[index] = Related::One(object);
        Ok(())
    }

    pub fn set_many(&self, relation: &str, objects: Vec<Object>) -> Result<(), AccessError> {
        let index = self.expect_cardinality(relation, Cardinality::Many)?;
        for o in &objects {
            self.check_target(index, o)?;
        }
        self.0.borrow_mut().relations[index] = Related::Many(objects);
        Ok(())
    }

    /// Reset slot `index` to an empty loaded state.
    pub(crate) fn init_relation(&self, index: usize) {
        let mut data = self.0.borrow_mut();
        data.relations[index] = match data.descriptor.relations()[index].cardinality {
            Cardinality::One => Related::One(None),
            Cardinality::Many => Related::Many(Vec::new()),
        };
    }

    /// Attach `object` to slot `index`, skipping instances already present.
    pub(crate) fn push_related(&self, index: usize, object: &Object) {
        let mut data = self.0.borrow_mut();
        let cardinality = data.descriptor.relations()[index].cardinality;
        let slot = &mut data.relations[index];
        match cardinality {
            Cardinality::One => *slot = Related::One(Some(object.clone())),
            Cardinality::Many => match slot {
                Related::Many(items) => {
                    if !items.iter().any(|o| o.same(object)) {
                        items.push(object.clone());
                    }
                }
                _ => *slot = Related::Many(vec![object.clone()]),
            },
        }
    }

    /// Make slot `index` hold what `other`'s slot holds.
    pub(crate) fn copy_relation(&self, index: usize, other: &Object) {
        if self.same(other) {
            return;
        }
        let related = other.related_at(index);
        self.0.borrow_mut().relations[index] = related;
    }

    /// Drop every relation slot back to unloaded, breaking reference cycles.
    pub fn clear_relations(&self) {
        for slot in self.0.borrow_mut().relations.iter_mut() {
            *slot = Related::Unloaded;
        }
    }

    fn expect_cardinality(&self, relation: &str, expected: Cardinality) -> Result<usize, AccessError> {
        let index = self.relation_index(relation)?;
        let data = self.0.borrow();
        let actual = data.descriptor.relations()[index].cardinality;
        if actual != expected {
            return Err(AccessError::Cardinality {
                entity: data.descriptor.name().into(),
                relation: relation.into(),
                cardinality: actual.name(),
            });
        }
        Ok(index)
    }

    fn check_target(&self, index: usize, object: &Object) -> Result<(), AccessError> {
        let data = self.0.borrow();
        let relation = &data.descriptor.relations()[index];
        let actual = object.entity_name();
        if relation.target != actual {
            return Err(AccessError::WrongTarget {
                entity: data.descriptor.name().into(),
                relation: relation.name.clone(),
                expected: relation.target.clone(),
                actual,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Object {
    // Relations print as counts; printing them in full recurses on cycles.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.borrow();
        let mut s = f.debug_struct(data.descriptor.name());
        for (field, value) in data.descriptor.fields().iter().zip(&data.values) {
            s.field(&field.name, value);
        }
        for (relation, slot) in data.descriptor.relations().iter().zip(&data.relations) {
            match slot {
                Related::Unloaded => s.field(&relation.name, &format_args!("<unloaded>")),
                Related::One(None) => s.field(&relation.name, &format_args!("None")),
                Related::One(Some(o)) => s.field(&relation.name, &format_args!("{:?}", o.entity_ref())),
                Related::Many(v) => s.field(&relation.name, &format_args!("[{} objects]", v.len())),
            };
        }
        s.finish()
    }
}

//! Entity, field and relation descriptors.
//!
//! Descriptors are built once (usually at startup), validated, and shared
//! behind `Arc`. Field access goes through [`FieldHandle`]s resolved from
//! names once, so hot paths index straight into an object's storage.

use std::collections::HashMap;
use std::sync::Arc;

use inflector::Inflector;
use once_cell::sync::OnceCell;

use crate::error::MappingError;
use crate::value::Value;

// ============================================================================
// Fields
// ============================================================================

/// Storage kind of a field. Used to coerce values read back from a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Float,
    Text,
    Bool,
    Bytes,
    /// Accept whatever the driver returns.
    Any,
}

impl FieldKind {
    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::Text => "text",
            FieldKind::Bool => "bool",
            FieldKind::Bytes => "bytes",
            FieldKind::Any => "any",
        }
    }

    /// Convert `value` to this kind, or `None` if it cannot be represented.
    ///
    /// Drivers without native booleans hand back integers; floats stored in
    /// integer columns come back as integers. Both are accepted.
    pub fn coerce(self, value: Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Null) => Some(Value::Null),
            (FieldKind::Any, v) => Some(v),
            (FieldKind::Int, Value::Int(i)) => Some(Value::Int(i)),
            (FieldKind::Int, Value::Bool(b)) => Some(Value::Int(b as i64)),
            (FieldKind::Float, Value::Float(f)) => Some(Value::Float(f)),
            (FieldKind::Float, Value::Int(i)) => Some(Value::Float(i as f64)),
            (FieldKind::Text, Value::Text(s)) => Some(Value::Text(s)),
            (FieldKind::Bool, Value::Bool(b)) => Some(Value::Bool(b)),
            (FieldKind::Bool, Value::Int(i)) => Some(Value::Bool(i != 0)),
            (FieldKind::Bytes, Value::Bytes(b)) => Some(Value::Bytes(b)),
            (FieldKind::Bytes, Value::Text(s)) => Some(Value::Bytes(s.into_bytes())),
            _ => None,
        }
    }
}

/// A mapped scalar field.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct FieldDescriptor {
    pub name: String,
    pub column: String,
    pub kind: FieldKind,
    pub length: Option<u32>,
    pub nullable: bool,
}

impl FieldDescriptor {
    /// A nullable field whose column is the snake-cased field name.
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            column: name.to_snake_case(),
            kind,
            length: None,
            nullable: true,
        }
    }

    pub fn column(mut self, column: &str) -> Self {
        self.column = column.into();
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Resolved position of a field inside an entity's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldHandle(pub(crate) usize);

impl FieldHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// How primary keys come into existence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdGeneration {
    /// The caller supplies the id.
    Assigned,
    /// The database assigns it on insert (identity / auto-increment).
    Identity,
    /// Drawn from the named sequence inside the INSERT.
    Sequence(String),
}

impl IdGeneration {
    pub fn is_generated(&self) -> bool {
        !matches!(self, IdGeneration::Assigned)
    }
}

// ============================================================================
// Relations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

impl Cardinality {
    pub fn name(self) -> &'static str {
        match self {
            Cardinality::One => "one",
            Cardinality::Many => "many",
        }
    }
}

/// Which table holds a join column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    /// On the source entity's table, pointing at the target.
    Local,
    /// On the target entity's table, pointing back at the source.
    Remote,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinMechanism {
    JoinColumn {
        column: String,
        side: JoinSide,
        /// Column the FK points at; the id column when `None`.
        referenced_column: Option<String>,
        /// Whether the FK may be set to NULL when an association is dropped.
        nullable: bool,
    },
    JoinTable {
        table: String,
        schema: Option<String>,
        source_column: String,
        target_column: String,
    },
}

/// A relation between two entity types.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDescriptor {
    pub name: String,
    pub source: String,
    pub target: String,
    pub cardinality: Cardinality,
    pub mechanism: JoinMechanism,
    pub profiles: Vec<String>,
    /// `false` keeps the relation out of auto-join traversal.
    pub auto_join: bool,
}

impl RelationDescriptor {
    /// A to-one relation named `name` targeting `target`.
    pub fn one(name: &str, target: &str) -> RelationBuilder {
        RelationBuilder::new(name, target, Cardinality::One)
    }

    /// A to-many relation named `name` targeting `target`.
    pub fn many(name: &str, target: &str) -> RelationBuilder {
        RelationBuilder::new(name, target, Cardinality::Many)
    }

    /// `Source.relation`, the identity used by cycle detection.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.source, self.name)
    }

    pub fn in_profiles(&self, profiles: &[String]) -> bool {
        self.profiles.iter().any(|p| profiles.contains(p))
    }
}

/// Builder for [`RelationDescriptor`]; the source is filled in by the entity.
#[derive(Debug, Clone)]
#[must_use = "builders have no effect until used"]
pub struct RelationBuilder {
    name: String,
    target: String,
    cardinality: Cardinality,
    mechanism: Option<JoinMechanism>,
    profiles: Vec<String>,
    auto_join: bool,
}

impl RelationBuilder {
    fn new(name: &str, target: &str, cardinality: Cardinality) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            cardinality,
            mechanism: None,
            profiles: Vec::new(),
            auto_join: true,
        }
    }

    pub fn join_column(mut self, column: &str, side: JoinSide) -> Self {
        self.mechanism = Some(JoinMechanism::JoinColumn {
            column: column.into(),
            side,
            referenced_column: None,
            nullable: true,
        });
        self
    }

    /// Point the join column at a non-id column.
    pub fn referenced_column(mut self, column: &str) -> Self {
        if let Some(JoinMechanism::JoinColumn {
            referenced_column, ..
        }) = &mut self.mechanism
        {
            *referenced_column = Some(column.into());
        }
        self
    }

    /// The join column may not be nulled out when associations change.
    pub fn required(mut self) -> Self {
        if let Some(JoinMechanism::JoinColumn { nullable, .. }) = &mut self.mechanism {
            *nullable = false;
        }
        self
    }

    pub fn join_table(mut self, table: &str, source_column: &str, target_column: &str) -> Self {
        self.mechanism = Some(JoinMechanism::JoinTable {
            table: table.into(),
            schema: None,
            source_column: source_column.into(),
            target_column: target_column.into(),
        });
        self
    }

    pub fn join_table_schema(mut self, schema: &str) -> Self {
        if let Some(JoinMechanism::JoinTable { schema: s, .. }) = &mut self.mechanism {
            *s = Some(schema.into());
        }
        self
    }

    pub fn profile(mut self, profile: &str) -> Self {
        self.profiles.push(profile.into());
        self
    }

    pub fn no_auto_join(mut self) -> Self {
        self.auto_join = false;
        self
    }

    fn build(self, source: &str) -> Result<RelationDescriptor, MappingError> {
        let mechanism = self
            .mechanism
            .ok_or_else(|| MappingError::MissingJoinDescriptor {
                entity: source.into(),
                relation: self.name.clone(),
            })?;
        Ok(RelationDescriptor {
            name: self.name,
            source: source.into(),
            target: self.target,
            cardinality: self.cardinality,
            mechanism,
            profiles: self.profiles,
            auto_join: self.auto_join,
        })
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Mapping metadata of one entity type.
#[derive(Debug)]
pub struct EntityDescriptor {
    name: String,
    table: String,
    schema: Option<String>,
    fields: Vec<FieldDescriptor>,
    id: FieldHandle,
    id_generation: IdGeneration,
    natural_key: Vec<FieldHandle>,
    relations: Vec<Arc<RelationDescriptor>>,
    field_index: OnceCell<HashMap<String, FieldHandle>>,
}

impl EntityDescriptor {
    pub fn builder(name: &str) -> EntityBuilder {
        EntityBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// All fields in declaration order, id included.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field_at(&self, handle: FieldHandle) -> &FieldDescriptor {
        &self.fields[handle.0]
    }

    /// Resolve a field name to its handle.
    pub fn field_handle(&self, name: &str) -> Option<FieldHandle> {
        self.field_index
            .get_or_init(|| {
                self.fields
                    .iter()
                    .enumerate()
                    .map(|(i, f)| (f.name.clone(), FieldHandle(i)))
                    .collect()
            })
            .get(name)
            .copied()
    }

    /// Like [`field_handle`](Self::field_handle), failing with a mapping error.
    pub fn require_field(&self, name: &str) -> Result<FieldHandle, MappingError> {
        self.field_handle(name)
            .ok_or_else(|| MappingError::UnknownField {
                entity: self.name.clone(),
                field: name.into(),
            })
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.field_handle(name).map(|h| self.field_at(h))
    }

    /// Field stored in `column`, if any.
    pub fn field_by_column(&self, column: &str) -> Option<FieldHandle> {
        self.fields
            .iter()
            .position(|f| f.column == column)
            .map(FieldHandle)
    }

    pub fn id_handle(&self) -> FieldHandle {
        self.id
    }

    pub fn id_field(&self) -> &FieldDescriptor {
        self.field_at(self.id)
    }

    pub fn id_generation(&self) -> &IdGeneration {
        &self.id_generation
    }

    pub fn natural_key(&self) -> &[FieldHandle] {
        &self.natural_key
    }

    pub fn relations(&self) -> &[Arc<RelationDescriptor>] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&Arc<RelationDescriptor>> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn relation_index(&self, name: &str) -> Option<usize> {
        self.relations.iter().position(|r| r.name == name)
    }

    pub fn require_relation(&self, name: &str) -> Result<&Arc<RelationDescriptor>, MappingError> {
        self.relation(name)
            .ok_or_else(|| MappingError::UnknownRelation {
                entity: self.name.clone(),
                relation: name.into(),
            })
    }

    /// Column that `mechanism`'s FK refers to on this entity.
    pub(crate) fn referenced_column<'a>(&'a self, referenced: &'a Option<String>) -> &'a str {
        referenced.as_deref().unwrap_or(&self.id_field().column)
    }
}

/// Builder for [`EntityDescriptor`].
#[derive(Debug, Clone)]
#[must_use = "builders have no effect until used"]
pub struct EntityBuilder {
    name: String,
    table: Option<String>,
    schema: Option<String>,
    fields: Vec<FieldDescriptor>,
    ids: Vec<(usize, IdGeneration)>,
    natural_key: Vec<String>,
    relations: Vec<RelationBuilder>,
}

impl EntityBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            table: None,
            schema: None,
            fields: Vec::new(),
            ids: Vec::new(),
            natural_key: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Table name; defaults to the snake-cased entity name.
    pub fn table(mut self, table: &str) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Declare the id field.
    pub fn id(self, name: &str, kind: FieldKind, generation: IdGeneration) -> Self {
        self.id_field(FieldDescriptor::new(name, kind).not_null(), generation)
    }

    pub fn id_field(mut self, field: FieldDescriptor, generation: IdGeneration) -> Self {
        self.ids.push((self.fields.len(), generation));
        self.fields.push(field);
        self
    }

    pub fn field(self, name: &str, kind: FieldKind) -> Self {
        self.field_with(FieldDescriptor::new(name, kind))
    }

    pub fn field_with(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn natural_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.natural_key = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn relation(mut self, relation: RelationBuilder) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn build(self) -> Result<EntityDescriptor, MappingError> {
        let mut ids = self.ids.into_iter();
        let (id_index, id_generation) = ids
            .next()
            .ok_or_else(|| MappingError::NoIdField(self.name.clone()))?;
        if let Some((second, _)) = ids.next() {
            return Err(MappingError::MultipleIdCandidates {
                entity: self.name.clone(),
                first: self.fields[id_index].name.clone(),
                second: self.fields[second].name.clone(),
            });
        }

        let natural_key = self
            .natural_key
            .iter()
            .map(|name| {
                self.fields
                    .iter()
                    .position(|f| &f.name == name)
                    .map(FieldHandle)
                    .ok_or_else(|| MappingError::UnknownField {
                        entity: self.name.clone(),
                        field: name.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let relations = self
            .relations
            .into_iter()
            .map(|r| r.build(&self.name).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EntityDescriptor {
            table: self.table.unwrap_or_else(|| self.name.to_snake_case()),
            name: self.name,
            schema: self.schema,
            fields: self.fields,
            id: FieldHandle(id_index),
            id_generation,
            natural_key,
            relations,
            field_index: OnceCell::new(),
        })
    }
}

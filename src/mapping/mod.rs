//! Mapping metadata: what tables, columns and relations each entity type has.
//!
//! The engine never inspects user types. Everything it knows about an entity
//! comes from a [`MappingProvider`], usually a [`Registry`] built at startup:
//!
//! ```ignore
//! let registry = Registry::builder()
//!     .entity(
//!         EntityDescriptor::builder("Author")
//!             .id("id", FieldKind::Int, IdGeneration::Identity)
//!             .field("name", FieldKind::Text)
//!             .natural_key(["name"])
//!             .relation(RelationDescriptor::many("books", "Book").join_column("author_id", JoinSide::Remote))
//!             .build()?,
//!     )
//!     .entity(book)
//!     .build()?;
//! ```

mod descriptor;
mod registry;

pub use descriptor::{
    Cardinality, EntityBuilder, EntityDescriptor, FieldDescriptor, FieldHandle, FieldKind,
    IdGeneration, JoinMechanism, JoinSide, RelationBuilder, RelationDescriptor,
};
pub use registry::{Registry, RegistryBuilder, SchemaGraph};

use std::sync::Arc;

use crate::error::MappingError;
use crate::join::{self, JoinNode};

/// Source of entity metadata.
///
/// Implementations are shared across threads and must tolerate concurrent
/// reads; anything memoized must be synchronized.
pub trait MappingProvider: Send + Sync {
    fn entity(&self, name: &str) -> Result<Arc<EntityDescriptor>, MappingError>;

    fn entity_names(&self) -> Vec<String>;

    /// Relations leaving `entity`, in traversal order.
    fn relations_from(&self, entity: &str) -> Result<Vec<Arc<RelationDescriptor>>, MappingError> {
        Ok(self.entity(entity)?.relations().to_vec())
    }

    /// Auto-join tree for `entity`, restricted to `profiles` when given.
    ///
    /// The default recomputes on every call; [`Registry`] memoizes.
    fn auto_joins(
        &self,
        entity: &str,
        profiles: Option<&[String]>,
    ) -> Result<Arc<Vec<JoinNode>>, MappingError> {
        join::build_auto_joins(self, entity, profiles).map(Arc::new)
    }
}

//! # Heron
//!
//! An object-relational query engine that renders multi-dialect SQL from
//! entity metadata and maps result rows back onto an object graph.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │            Mapping (entity + relation metadata)          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [context / join graph]
//! ┌─────────────────────────────────────────────────────────┐
//! │      Contexts, JoinNode trees, Evaluation predicates     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [engine]
//! ┌─────────────────────────────────────────────────────────┐
//! │      Select / Upsert / Delete / Hydrate builders         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [sql]
//! ┌─────────────────────────────────────────────────────────┐
//! │     Token streams rendered per dialect into Statements   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [connection]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Rows mapped onto instances through a first-level cache │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine logs through `tracing` and never installs a subscriber.

pub mod cache;
pub mod config;
pub mod connection;
pub mod context;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod join;
pub mod mapping;
pub mod object;
pub mod sql;
pub mod value;

pub use error::{Error, Result};

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::cache::FirstLevelCache;
    pub use crate::config::Settings;
    pub use crate::connection::{Connection, SqliteConnection};
    pub use crate::context::Context;
    pub use crate::engine::{
        Delete, ExecutionOptions, Hydrate, HydrateReport, Select, SerializedQuery, Strategy,
        Upsert, UpsertSummary,
    };
    pub use crate::error::{Error, Result};
    pub use crate::evaluation::{CrossPath, Evaluation, Operand, Operator};
    pub use crate::join::{join_all, join_profiles, JoinNode};
    pub use crate::mapping::{
        Cardinality, EntityDescriptor, FieldDescriptor, FieldKind, IdGeneration, JoinSide,
        MappingProvider, RelationDescriptor, Registry,
    };
    pub use crate::object::{EntityRef, Object, Related};
    pub use crate::sql::{Dialect, PagingMethod, SortDir, SqlDialect, Statement};
    pub use crate::value::{Key, Value};
}

//! Error types for the query engine.

use thiserror::Error;

use crate::connection::ConnectionError;
use crate::sql::Statement;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Mapping metadata
// ============================================================================

/// Entity metadata is missing or inconsistent.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    #[error("entity `{0}` declares no id field")]
    NoIdField(String),

    #[error("entity `{entity}` declares more than one id field: `{first}` and `{second}`")]
    MultipleIdCandidates {
        entity: String,
        first: String,
        second: String,
    },

    #[error("relation `{entity}.{relation}` has no join column or join table")]
    MissingJoinDescriptor { entity: String, relation: String },

    #[error("unknown entity type `{0}`")]
    UnknownEntity(String),

    #[error("entity type `{0}` is registered twice")]
    DuplicateEntity(String),

    #[error("entity `{entity}` has no field `{field}`")]
    UnknownField { entity: String, field: String },

    #[error("entity `{entity}` has no relation `{relation}`")]
    UnknownRelation { entity: String, relation: String },

    #[error("entity `{entity}` has no column `{column}`")]
    UnknownColumn { entity: String, column: String },

    #[error("entity `{0}` declares no natural key")]
    NoNaturalKey(String),
}

// ============================================================================
// Object access
// ============================================================================

/// Reading or writing an entity instance failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccessError {
    #[error("`{entity}` has no field `{field}`")]
    UnknownField { entity: String, field: String },

    #[error("`{entity}` has no relation `{relation}`")]
    UnknownRelation { entity: String, relation: String },

    #[error("`{entity}.{field}` expects {expected}, got {actual}")]
    TypeMismatch {
        entity: String,
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("`{entity}.{relation}` is a to-{cardinality} relation")]
    Cardinality {
        entity: String,
        relation: String,
        cardinality: &'static str,
    },

    #[error("`{entity}.{relation}` expects `{expected}` objects, got `{actual}`")]
    WrongTarget {
        entity: String,
        relation: String,
        expected: String,
        actual: String,
    },

    #[error("`{entity}` id value {value} is not a valid key")]
    InvalidKey { entity: String, value: String },
}

// ============================================================================
// Join traversal
// ============================================================================

/// A relation field repeats along one auto-join path.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("join cycle at `{relation}` along {}", .path.join(" -> "))]
pub struct JoinCycleError {
    pub relation: String,
    pub path: Vec<String>,
}

// ============================================================================
// Serialized queries
// ============================================================================

/// A JSON query document does not fit the live mapping.
#[derive(Debug, Error)]
pub enum SerializedQueryError {
    #[error("malformed query document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown entity type `{0}`")]
    UnknownType(String),

    #[error("`{entity}` has no field `{field}`")]
    UnknownField { entity: String, field: String },

    #[error("`{entity}` has no relation `{relation}`")]
    UnknownRelation { entity: String, relation: String },

    #[error("cross path rooted at `{found}` used from `{expected}`")]
    RootMismatch { expected: String, found: String },
}

// ============================================================================
// Execution
// ============================================================================

/// A statement failed in the connection. Carries the statement for diagnostics.
#[derive(Debug, Error)]
#[error("failed to execute `{}`: {source}", .statement.sql)]
pub struct SqlExecutionError {
    pub statement: Statement,
    #[source]
    pub source: ConnectionError,
}

// ============================================================================
// Top-level error
// ============================================================================

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    JoinCycle(#[from] JoinCycleError),

    #[error(transparent)]
    SerializedQuery(#[from] SerializedQueryError),

    #[error(transparent)]
    Execution(#[from] Box<SqlExecutionError>),

    /// The caller asked for something the engine cannot render.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl Error {
    pub(crate) fn execution(statement: &Statement, source: ConnectionError) -> Self {
        Error::Execution(Box::new(SqlExecutionError {
            statement: statement.clone(),
            source,
        }))
    }
}

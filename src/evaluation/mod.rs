//! Predicate algebra for WHERE clauses.
//!
//! An [`Evaluation`] names fields by string and is resolved against a
//! [`Context`](crate::context::Context) only when rendered, so the same tree
//! can restrict the root of a query, a join node, or a relabeled copy inside
//! a correlated subquery. Evaluations serialize to tagged JSON:
//!
//! ```json
//! {"kind": "or", "evaluations": [
//!   {"kind": "comparison", "field": "name", "operator": "eq", "operand": {"value": "Ann"}},
//!   {"kind": "id_in", "ids": [1, 2]}
//! ]}
//! ```

mod json;
mod render;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{MappingError, Result};
use crate::mapping::MappingProvider;
use crate::object::Object;
use crate::sql::expr::BinaryOperator;
use crate::value::{Key, Value};

/// A node of the WHERE-clause predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evaluation {
    /// `field <op> ?`, or `field <op> other.column` for a path operand.
    Comparison {
        field: String,
        operator: Operator,
        operand: Operand,
    },
    /// All children hold. Empty means no restriction.
    And { evaluations: Vec<Evaluation> },
    /// Any child holds. Empty means no restriction.
    Or { evaluations: Vec<Evaluation> },
    In { field: String, values: Vec<Value> },
    IdIn { ids: Vec<Key> },
    /// Natural-key fields equal the captured values; missing or null values
    /// match `IS NULL`.
    NaturalKeyMatch { values: BTreeMap<String, Value> },
    /// Hand-written SQL with `:name` parameters and `{this}` for the alias
    /// of the context it is applied to.
    Explicit {
        expression: String,
        #[serde(default)]
        parameters: BTreeMap<String, Value>,
    },
    /// Compare a column reached through relation steps from the query root.
    CrossPath {
        path: CrossPath,
        operator: Operator,
        operand: Operand,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
}

impl Operator {
    pub(crate) fn binary(self) -> BinaryOperator {
        match self {
            Operator::Eq => BinaryOperator::Eq,
            Operator::Ne => BinaryOperator::Ne,
            Operator::Lt => BinaryOperator::Lt,
            Operator::Le => BinaryOperator::Lte,
            Operator::Gt => BinaryOperator::Gt,
            Operator::Ge => BinaryOperator::Gte,
            Operator::Like => BinaryOperator::Like,
            Operator::NotLike => BinaryOperator::NotLike,
        }
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Value(Value),
    Path(CrossPath),
}

macro_rules! operand_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Operand {
            fn from(value: $ty) -> Self {
                Operand::Value(value.into())
            }
        })*
    };
}

operand_from!(Value, bool, i32, i64, f64, &str, String, Key);

impl From<CrossPath> for Operand {
    fn from(path: CrossPath) -> Self {
        Operand::Path(path)
    }
}

/// `root.steps[0].steps[1]...field`: a column reached by walking relations
/// from the query's root type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossPath {
    pub root: String,
    #[serde(default)]
    pub steps: Vec<String>,
    pub field: String,
}

impl CrossPath {
    pub fn new(root: &str, steps: &[&str], field: &str) -> Self {
        Self {
            root: root.into(),
            steps: steps.iter().map(|s| s.to_string()).collect(),
            field: field.into(),
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl Evaluation {
    pub fn compare(field: &str, operator: Operator, operand: impl Into<Operand>) -> Self {
        Evaluation::Comparison {
            field: field.into(),
            operator,
            operand: operand.into(),
        }
    }

    pub fn eq(field: &str, operand: impl Into<Operand>) -> Self {
        Self::compare(field, Operator::Eq, operand)
    }

    pub fn ne(field: &str, operand: impl Into<Operand>) -> Self {
        Self::compare(field, Operator::Ne, operand)
    }

    pub fn lt(field: &str, operand: impl Into<Operand>) -> Self {
        Self::compare(field, Operator::Lt, operand)
    }

    pub fn le(field: &str, operand: impl Into<Operand>) -> Self {
        Self::compare(field, Operator::Le, operand)
    }

    pub fn gt(field: &str, operand: impl Into<Operand>) -> Self {
        Self::compare(field, Operator::Gt, operand)
    }

    pub fn ge(field: &str, operand: impl Into<Operand>) -> Self {
        Self::compare(field, Operator::Ge, operand)
    }

    pub fn like(field: &str, pattern: &str) -> Self {
        Self::compare(field, Operator::Like, pattern)
    }

    pub fn and(evaluations: Vec<Evaluation>) -> Self {
        Evaluation::And { evaluations }
    }

    pub fn or(evaluations: Vec<Evaluation>) -> Self {
        Evaluation::Or { evaluations }
    }

    pub fn is_in<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Evaluation::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn id_in<K: Into<Key>>(ids: impl IntoIterator<Item = K>) -> Self {
        Evaluation::IdIn {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Match rows whose natural key equals `reference`'s.
    pub fn natural_key_match(reference: &Object) -> std::result::Result<Self, MappingError> {
        let descriptor = reference.descriptor();
        if descriptor.natural_key().is_empty() {
            return Err(MappingError::NoNaturalKey(descriptor.name().into()));
        }
        let values = descriptor
            .natural_key()
            .iter()
            .map(|&h| (descriptor.field_at(h).name.clone(), reference.get_at(h)))
            .collect();
        Ok(Evaluation::NaturalKeyMatch { values })
    }

    pub fn explicit<'a>(
        expression: &str,
        parameters: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Self {
        Evaluation::Explicit {
            expression: expression.into(),
            parameters: parameters
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    pub fn cross(path: CrossPath, operator: Operator, operand: impl Into<Operand>) -> Self {
        Evaluation::CrossPath {
            path,
            operator,
            operand: operand.into(),
        }
    }

    /// Serialize to the tagged JSON form.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| crate::error::SerializedQueryError::Malformed(e).into())
    }
}

/// AND together `evaluations` into one node, unwrapping a single one.
pub(crate) fn combine(mut evaluations: Vec<Evaluation>) -> Option<Evaluation> {
    match evaluations.len() {
        0 => None,
        1 => evaluations.pop(),
        _ => Some(Evaluation::And { evaluations }),
    }
}

/// Resolve every reference in `evaluations` against `provider`, failing on
/// the first that no longer exists.
pub(crate) fn validate_all(
    evaluations: &[Evaluation],
    context: &crate::context::Context,
    provider: &dyn MappingProvider,
) -> std::result::Result<(), crate::error::SerializedQueryError> {
    evaluations
        .iter()
        .try_for_each(|e| e.validate(context, provider))
}

//! Reading evaluations back from JSON against a live mapping.

use super::{CrossPath, Evaluation, Operand};
use crate::context::Context;
use crate::error::{MappingError, SerializedQueryError};
use crate::mapping::{EntityDescriptor, MappingProvider};

impl Evaluation {
    /// Parse `json` and check every field, relation and type it names
    /// against `context` and `provider`.
    pub fn from_json(
        json: &str,
        context: &Context,
        provider: &dyn MappingProvider,
    ) -> Result<Self, SerializedQueryError> {
        let evaluation: Evaluation = serde_json::from_str(json)?;
        evaluation.validate(context, provider)?;
        Ok(evaluation)
    }

    /// Check that every reference still resolves.
    pub fn validate(
        &self,
        context: &Context,
        provider: &dyn MappingProvider,
    ) -> Result<(), SerializedQueryError> {
        let target = context.target();
        match self {
            Evaluation::Comparison { field, operand, .. } => {
                require_field(target, field)?;
                validate_operand(operand, context, provider)
            }
            Evaluation::And { evaluations } | Evaluation::Or { evaluations } => evaluations
                .iter()
                .try_for_each(|e| e.validate(context, provider)),
            Evaluation::In { field, .. } => require_field(target, field),
            Evaluation::IdIn { .. } | Evaluation::Explicit { .. } => Ok(()),
            Evaluation::NaturalKeyMatch { values } => {
                values.keys().try_for_each(|field| require_field(target, field))
            }
            Evaluation::CrossPath { path, operand, .. } => {
                validate_path(path, context, provider)?;
                validate_operand(operand, context, provider)
            }
        }
    }
}

fn validate_operand(
    operand: &Operand,
    context: &Context,
    provider: &dyn MappingProvider,
) -> Result<(), SerializedQueryError> {
    match operand {
        Operand::Value(_) => Ok(()),
        Operand::Path(path) => validate_path(path, context, provider),
    }
}

fn validate_path(
    path: &CrossPath,
    context: &Context,
    provider: &dyn MappingProvider,
) -> Result<(), SerializedQueryError> {
    let root = context.root_context();
    if root.target().name() != path.root {
        return Err(SerializedQueryError::RootMismatch {
            expected: root.target().name().into(),
            found: path.root.clone(),
        });
    }
    let mut current = std::sync::Arc::clone(root.target());
    for step in &path.steps {
        let target = current
            .relation(step)
            .ok_or_else(|| SerializedQueryError::UnknownRelation {
                entity: current.name().into(),
                relation: step.clone(),
            })?
            .target
            .clone();
        current = lookup(provider, &target)?;
    }
    require_field(&current, &path.field)
}

pub(crate) fn lookup(
    provider: &dyn MappingProvider,
    entity: &str,
) -> Result<std::sync::Arc<EntityDescriptor>, SerializedQueryError> {
    provider.entity(entity).map_err(|e| match e {
        MappingError::UnknownEntity(name) => SerializedQueryError::UnknownType(name),
        other => SerializedQueryError::UnknownType(other.to_string()),
    })
}

pub(crate) fn require_field(
    entity: &EntityDescriptor,
    field: &str,
) -> Result<(), SerializedQueryError> {
    match entity.field_handle(field) {
        Some(_) => Ok(()),
        None => Err(SerializedQueryError::UnknownField {
            entity: entity.name().into(),
            field: field.into(),
        }),
    }
}

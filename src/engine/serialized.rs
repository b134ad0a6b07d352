//! JSON documents describing a select.
//!
//! A document names its target type, a tree of joins by relation name, a
//! `where` evaluation tree, ordering and paging. Reading one back resolves
//! every name against the live mapping, so a document written against an
//! older schema fails loudly instead of rendering stale columns.

use serde::{Deserialize, Serialize};

use super::select::Select;
use crate::context::Context;
use crate::error::{Result, SerializedQueryError};
use crate::evaluation::{combine, Evaluation};
use crate::join::JoinNode;
use crate::mapping::MappingProvider;
use crate::sql::query::SortDir;

/// A select as a JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedQuery {
    pub target: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joins: Vec<SerializedJoin>,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Evaluation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<SerializedOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<SerializedPage>,
}

/// One join, by the relation's name on the enclosing type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedJoin {
    pub relation: String,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Evaluation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<Evaluation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joins: Vec<SerializedJoin>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedOrder {
    pub field: String,
    #[serde(default)]
    pub dir: SortDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedPage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

// ============================================================================
// Select -> document
// ============================================================================

impl Select<'_> {
    pub fn to_serialized(&self) -> SerializedQuery {
        let page = (self.offset.is_some() || self.limit.is_some()).then_some(SerializedPage {
            offset: self.offset,
            limit: self.limit,
        });
        SerializedQuery {
            target: self.root.target().name().to_string(),
            joins: self.joins.iter().map(serialize_join).collect(),
            filter: combine(self.filters.clone()),
            order_by: self
                .order
                .iter()
                .map(|(field, dir)| SerializedOrder {
                    field: field.clone(),
                    dir: *dir,
                })
                .collect(),
            page,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.to_serialized())
            .map_err(|e| SerializedQueryError::Malformed(e).into())
    }
}

fn serialize_join(node: &JoinNode) -> SerializedJoin {
    SerializedJoin {
        relation: node.relation.name.clone(),
        filter: combine(node.filters.clone()),
        on: combine(node.on.clone()),
        joins: node.children.iter().map(serialize_join).collect(),
    }
}

// ============================================================================
// Document -> Select
// ============================================================================

impl<'p> Select<'p> {
    /// Rebuild a select from `json`, resolving every name against `provider`.
    pub fn from_json(provider: &'p dyn MappingProvider, json: &str) -> Result<Self> {
        let document: SerializedQuery =
            serde_json::from_str(json).map_err(SerializedQueryError::Malformed)?;
        Self::from_serialized(provider, &document)
    }

    pub fn from_serialized(provider: &'p dyn MappingProvider, document: &SerializedQuery) -> Result<Self> {
        let descriptor = provider
            .entity(&document.target)
            .map_err(|_| SerializedQueryError::UnknownType(document.target.clone()))?;
        let root = Context::root(descriptor);

        let mut select = Select::new(provider, &document.target)?;
        if let Some(filter) = &document.filter {
            filter.validate(&root, provider)?;
            select = select.filter(filter.clone());
        }
        for join in &document.joins {
            select = select.join(deserialize_join(provider, &root, join)?);
        }
        for order in &document.order_by {
            if root.target().field(&order.field).is_none() {
                return Err(SerializedQueryError::UnknownField {
                    entity: document.target.clone(),
                    field: order.field.clone(),
                }
                .into());
            }
            select = select.order_by(&order.field, order.dir);
        }
        if let Some(page) = document.page {
            if let Some(offset) = page.offset {
                select = select.offset(offset);
            }
            if let Some(limit) = page.limit {
                select = select.limit(limit);
            }
        }
        Ok(select)
    }
}

fn deserialize_join(
    provider: &dyn MappingProvider,
    parent: &Context,
    join: &SerializedJoin,
) -> Result<JoinNode> {
    let source = parent.target();
    let relation = source
        .relation(&join.relation)
        .ok_or_else(|| SerializedQueryError::UnknownRelation {
            entity: source.name().to_string(),
            relation: join.relation.clone(),
        })?;
    let target = provider
        .entity(&relation.target)
        .map_err(|_| SerializedQueryError::UnknownType(relation.target.clone()))?;
    let context = parent.to(target, &join.relation);

    let mut node = JoinNode::from_relation(relation.clone());
    if let Some(filter) = &join.filter {
        filter.validate(&context, provider)?;
        node = node.filter(filter.clone());
    }
    if let Some(on) = &join.on {
        on.validate(&context, provider)?;
        node = node.on(on.clone());
    }
    for child in &join.joins {
        node = node.child(deserialize_join(provider, &context, child)?);
    }
    Ok(node)
}

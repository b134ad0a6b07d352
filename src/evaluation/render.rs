//! Rendering evaluations into SQL expressions.

use std::sync::LazyLock;

use regex::Regex;

use super::{CrossPath, Evaluation, Operand, Operator};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::mapping::MappingProvider;
use crate::sql::expr::{conjunction, disjunction, Expr, ExprExt};
use crate::sql::statement::Parameter;
use crate::sql::token::{Token, TokenStream};
use crate::value::Value;

/// `::` casts pass through; `:name` binds a parameter; `{this}` is the alias.
static EXPLICIT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(::)|:([A-Za-z_]\w*)|(\{this\})").unwrap());

impl Evaluation {
    /// Render against `context`. `None` means "no restriction".
    pub fn to_expr(&self, context: &Context, provider: &dyn MappingProvider) -> Result<Option<Expr>> {
        match self {
            Evaluation::Comparison {
                field,
                operator,
                operand,
            } => {
                let column = context.column(field)?;
                let source = (context.target().name(), field.as_str());
                compare(column, *operator, operand, Some(source), context, provider).map(Some)
            }

            Evaluation::And { evaluations } => {
                let parts = render_all(evaluations, context, provider)?;
                Ok(conjunction(parts.into_iter().flatten()))
            }

            Evaluation::Or { evaluations } => {
                let parts = render_all(evaluations, context, provider)?;
                // A child without restriction makes the whole group true.
                if parts.iter().any(Option::is_none) {
                    return Ok(None);
                }
                Ok(disjunction(parts.into_iter().flatten()))
            }

            Evaluation::In { field, values } => {
                let column = context.column(field)?;
                let entity = context.target().name();
                let params = distinct(values.iter().cloned())
                    .into_iter()
                    .map(|v| Expr::Param(Parameter::field(entity, field, v)))
                    .collect::<Vec<_>>();
                Ok((!params.is_empty()).then(|| column.in_list(params)))
            }

            Evaluation::IdIn { ids } => {
                let descriptor = context.target();
                let id_name = &descriptor.id_field().name;
                let params = distinct(ids.iter().map(Value::from))
                    .into_iter()
                    .map(|v| Expr::Param(Parameter::field(descriptor.name(), id_name, v)))
                    .collect::<Vec<_>>();
                Ok((!params.is_empty()).then(|| context.id_column().in_list(params)))
            }

            Evaluation::NaturalKeyMatch { values } => {
                let descriptor = context.target();
                if descriptor.natural_key().is_empty() {
                    return Err(crate::error::MappingError::NoNaturalKey(
                        descriptor.name().into(),
                    )
                    .into());
                }
                let parts = descriptor.natural_key().iter().map(|&handle| {
                    let field = &descriptor.field_at(handle).name;
                    let column = context.column_at(handle);
                    match values.get(field) {
                        None | Some(Value::Null) => column.is_null(),
                        Some(v) => column.eq(Parameter::field(descriptor.name(), field, v.clone())),
                    }
                });
                Ok(conjunction(parts))
            }

            Evaluation::Explicit {
                expression,
                parameters,
            } => explicit(expression, parameters, context).map(Some),

            Evaluation::CrossPath {
                path,
                operator,
                operand,
            } => {
                let column = resolve_path(path, context, provider)?;
                compare(column, *operator, operand, None, context, provider).map(Some)
            }
        }
    }
}

fn render_all(
    evaluations: &[Evaluation],
    context: &Context,
    provider: &dyn MappingProvider,
) -> Result<Vec<Option<Expr>>> {
    evaluations
        .iter()
        .map(|e| e.to_expr(context, provider))
        .collect()
}

fn compare(
    column: Expr,
    operator: Operator,
    operand: &Operand,
    source: Option<(&str, &str)>,
    context: &Context,
    provider: &dyn MappingProvider,
) -> Result<Expr> {
    let right = match operand {
        Operand::Value(Value::Null) => {
            return match operator {
                Operator::Eq => Ok(column.is_null()),
                Operator::Ne => Ok(column.is_not_null()),
                other => Err(Error::InvalidQuery(format!(
                    "operator {other:?} cannot compare against NULL"
                ))),
            };
        }
        Operand::Value(v) => Expr::Param(match source {
            Some((entity, field)) => Parameter::field(entity, field, v.clone()),
            None => Parameter::new("value", v.clone()),
        }),
        Operand::Path(path) => resolve_path(path, context, provider)?,
    };
    Ok(Expr::BinaryOp {
        left: Box::new(column),
        op: operator.binary(),
        right: Box::new(right),
    })
}

/// Walk `path` from the root of `context`, the way the join graph aliases
/// the same positions.
pub(crate) fn resolve_path(
    path: &CrossPath,
    context: &Context,
    provider: &dyn MappingProvider,
) -> Result<Expr> {
    context.require_root(&path.root)?;
    let mut current = context.root_context();
    for step in &path.steps {
        current = current.descend(provider, step)?;
    }
    Ok(current.column(&path.field)?)
}

fn explicit(
    expression: &str,
    parameters: &std::collections::BTreeMap<String, Value>,
    context: &Context,
) -> Result<Expr> {
    let mut ts = TokenStream::new();
    let mut used = std::collections::BTreeSet::new();
    let mut last = 0;

    for caps in EXPLICIT_PATTERN.captures_iter(expression) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            ts.push(Token::Raw(expression[last..whole.start()].to_string()));
        }
        last = whole.end();

        if caps.get(1).is_some() {
            ts.push(Token::Raw("::".into()));
        } else if let Some(name) = caps.get(2) {
            let name = name.as_str();
            let value = parameters.get(name).ok_or_else(|| {
                Error::InvalidQuery(format!("explicit expression binds unknown parameter `:{name}`"))
            })?;
            used.insert(name);
            ts.push(Token::Placeholder(Parameter::new(name, value.clone())));
        } else {
            ts.push(Token::Alias(context.alias().to_string()));
        }
    }
    if last < expression.len() {
        ts.push(Token::Raw(expression[last..].to_string()));
    }

    if let Some(unused) = parameters.keys().find(|k| !used.contains(k.as_str())) {
        return Err(Error::InvalidQuery(format!(
            "explicit expression never references parameter `:{unused}`"
        )));
    }
    Ok(Expr::Paren(Box::new(Expr::Tokens(ts))))
}

/// Deduplicate, keeping first occurrences in order.
fn distinct(values: impl Iterator<Item = Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for v in values {
        if !out.contains(&v) {
            out.push(v);
        }
    }
    out
}

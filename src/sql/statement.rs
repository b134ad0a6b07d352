//! Executable statements: rendered SQL plus its positional parameters.

use std::fmt;
use std::time::Duration;

use super::dialect::Dialect;
use super::token::TokenStream;
use crate::value::Value;

/// One positional parameter of a [`Statement`].
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Logical name (field name, or the `:name` of an explicit expression).
    pub name: String,
    pub value: Value,
    /// `Entity.field` the value was read from, when there is one.
    pub source_field: Option<String>,
    /// Sequence references are rendered inline and never bound.
    pub is_sequence: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            source_field: None,
            is_sequence: false,
        }
    }

    /// A parameter bound from `entity.field`.
    pub fn field(entity: &str, field: &str, value: impl Into<Value>) -> Self {
        Self {
            name: field.to_string(),
            value: value.into(),
            source_field: Some(format!("{entity}.{field}")),
            is_sequence: false,
        }
    }

    pub fn sequence(sequence: &str) -> Self {
        Self {
            name: sequence.to_string(),
            value: Value::Null,
            source_field: None,
            is_sequence: true,
        }
    }
}

/// A rendered, single-use statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub parameters: Vec<Parameter>,
    /// Column whose database-generated value should be returned.
    pub generated_key: Option<String>,
    pub timeout: Option<Duration>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        Self {
            sql: sql.into(),
            parameters,
            generated_key: None,
            timeout: None,
        }
    }

    /// Render a token stream, collecting its placeholders.
    pub fn from_tokens(tokens: &TokenStream, dialect: Dialect) -> Self {
        Self::new(tokens.serialize(dialect), tokens.parameters())
    }

    #[must_use]
    pub fn with_generated_key(mut self, column: impl Into<String>) -> Self {
        self.generated_key = Some(column.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Values to bind, in `?` order.
    pub fn bind_values(&self) -> Vec<&Value> {
        self.parameters
            .iter()
            .filter(|p| !p.is_sequence)
            .map(|p| &p.value)
            .collect()
    }

    pub fn bind_count(&self) -> usize {
        self.parameters.iter().filter(|p| !p.is_sequence).count()
    }
}

/// Diagnostic rendering with parameters inlined. Never executed.
impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut values = self.bind_values().into_iter();
        for (i, part) in self.sql.split('?').enumerate() {
            if i > 0 {
                match values.next() {
                    Some(v) => write!(f, "{v}")?,
                    None => write!(f, "?")?,
                }
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

//! Execution options shared by every builder.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{Settings, SettingsError};
use crate::sql::{Dialect, PagingMethod, SqlDialect};

/// How a SELECT restricts its root rows while fetching joined columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// EXISTS without paging, IN with server-side paging, two queries otherwise.
    #[default]
    Auto,
    /// Correlated `EXISTS` over a relabeled copy of the join tree.
    Exists,
    /// `root.id IN (id subquery)`.
    In,
    /// Fetch ids first, then full rows for exactly those ids.
    TwoQuery,
}

/// Per-operation execution knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOptions {
    pub strategy: Strategy,
    /// `None` uses the dialect's paging method.
    pub paging_method: Option<PagingMethod>,
    /// `None` uses the dialect's bound-parameter limit.
    pub max_parameters: Option<usize>,
    pub timeout: Option<Duration>,
    /// Dialect `preview` renders for; executing uses the connection's.
    pub dialect: Dialect,
    /// Hydration logs a warning once it has run this many waves.
    pub hydration_warn_waves: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::Auto,
            paging_method: None,
            max_parameters: None,
            timeout: None,
            dialect: Dialect::default(),
            hydration_warn_waves: 32,
        }
    }
}

impl ExecutionOptions {
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        Ok(Self {
            strategy: settings.engine.strategy,
            paging_method: settings.engine.paging_method,
            max_parameters: settings.engine.max_parameters,
            timeout: settings.engine.timeout()?,
            dialect: settings.engine.dialect,
            hydration_warn_waves: settings.hydration.warn_after_waves,
        })
    }

    /// Effective bound-parameter ceiling for `dialect`.
    pub fn parameter_ceiling(&self, dialect: Dialect) -> usize {
        let limit = dialect.max_parameters();
        self.max_parameters.map_or(limit, |m| m.min(limit)).max(1)
    }

    /// Effective size of one `IN (...)` list for `dialect`.
    pub fn in_list_ceiling(&self, dialect: Dialect) -> usize {
        self.parameter_ceiling(dialect).min(dialect.max_in_list()).max(1)
    }

    pub fn paging_method(&self, dialect: Dialect) -> PagingMethod {
        self.paging_method.unwrap_or_else(|| dialect.paging_method())
    }
}

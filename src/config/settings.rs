//! TOML-based configuration for heron.
//!
//! Supports a config file (heron.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [engine]
//! dialect = "postgres"
//! strategy = "auto"           # auto | exists | in | two_query
//! paging_method = "offset_fetch"
//! max_parameters = 2000
//! statement_timeout = "${HERON_TIMEOUT}"
//!
//! [hydration]
//! warn_after_waves = 32
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::Strategy;
use crate::sql::{Dialect, PagingMethod};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "HERON_CONFIG";

/// Config file looked up in the working directory.
pub const CONFIG_FILE: &str = "heron.toml";

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid duration format: {0}")]
    InvalidDuration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Statement rendering and execution defaults.
    pub engine: EngineSettings,

    /// Recursive hydration thresholds.
    pub hydration: HydrationSettings,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Dialect `preview` renders for. Execution always uses the connection's.
    pub dialect: Dialect,

    /// Default SELECT strategy.
    pub strategy: Strategy,

    /// Paging method; the dialect's own method when unset.
    pub paging_method: Option<PagingMethod>,

    /// Bound-parameter ceiling; the dialect's limit when unset. Never raises
    /// the dialect's limit.
    pub max_parameters: Option<usize>,

    /// Statement timeout (e.g. "30s", "5m"). Empty disables it.
    pub statement_timeout: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            strategy: Strategy::default(),
            paging_method: None,
            max_parameters: None,
            statement_timeout: "30s".to_string(),
        }
    }
}

impl EngineSettings {
    /// Parsed statement timeout, `None` when disabled.
    pub fn timeout(&self) -> Result<Option<Duration>, SettingsError> {
        let raw = self.statement_timeout.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        parse_duration(raw).map(Some)
    }
}

/// Hydration configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HydrationSettings {
    /// Log a warning once a recursive hydration runs this many waves.
    pub warn_after_waves: usize,
}

impl Default for HydrationSettings {
    fn default() -> Self {
        Self {
            warn_after_waves: 32,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML text, expanding environment variables first.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let expanded = expand_env_vars(content)?;
        let settings: Settings = toml::from_str(&expanded)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `HERON_CONFIG`
    /// 2. `./heron.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var(CONFIG_ENV) {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from(CONFIG_FILE);
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        Ok(Settings::default())
    }

    /// Check values that deserialize but cannot be used.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.engine.max_parameters == Some(0) {
            return Err(SettingsError::InvalidConfig(
                "engine.max_parameters must be positive".to_string(),
            ));
        }
        if self.hydration.warn_after_waves == 0 {
            return Err(SettingsError::InvalidConfig(
                "hydration.warn_after_waves must be positive".to_string(),
            ));
        }
        self.engine.timeout()?;
        Ok(())
    }
}

/// Parse a duration such as `"250ms"`, `"30s"`, `"5m"` or `"1h"`.
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, SettingsError> {
    let s = s.trim();
    let invalid = || SettingsError::InvalidDuration(s.to_string());
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let amount: u64 = digits.parse().map_err(|_| invalid())?;
    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "" | "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount * 60)),
        "h" => Ok(Duration::from_secs(amount * 3600)),
        _ => Err(invalid()),
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        let var_name = if chars.next_if_eq(&'{').is_some() {
            let mut name = String::new();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                name.push(ch);
            }
            name
        } else {
            let mut name = String::new();
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                name.push(ch);
            }
            if name.is_empty() {
                // A lone `$` is kept.
                result.push('$');
                continue;
            }
            name
        };
        let value = env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name))?;
        result.push_str(&value);
    }

    Ok(result)
}

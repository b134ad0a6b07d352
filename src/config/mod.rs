//! Configuration for heron.
//!
//! Engine defaults (dialect, strategy, paging, parameter ceilings, statement
//! timeout) and hydration thresholds, read from TOML.

mod settings;

pub use settings::{
    expand_env_vars, parse_duration, EngineSettings, HydrationSettings, Settings, SettingsError,
};

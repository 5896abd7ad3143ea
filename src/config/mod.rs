//! Configuration module for relorm.
//!
//! Handles TOML settings and environment variable expansion.

mod settings;

pub use settings::{
    expand_env_vars, DatabaseSettings, QuerySettings, ResultSettings, Settings, SettingsError,
};

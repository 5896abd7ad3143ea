//! TOML-based configuration for relorm.
//!
//! Supports a config file (relorm.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [query]
//! dialect = "postgres"
//! peek_ahead = true
//! max_relation_depth = 8
//! subquery_alias_prefix = "sub_"
//!
//! [result]
//! cache = false
//!
//! [database]
//! path = "${HOME}/monitoring.sqlite"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::sql::Dialect;

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

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Query compilation settings.
    pub query: QuerySettings,

    /// Result set settings.
    pub result: ResultSettings,

    /// Database used by the CLI.
    pub database: DatabaseSettings,
}

/// Query compilation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuerySettings {
    /// SQL dialect statements are rendered for.
    pub dialect: Dialect,

    /// Fetch one row more than the limit to detect further pages.
    pub peek_ahead: bool,

    /// Maximum number of segments a relation path may have after rewrites.
    pub max_relation_depth: usize,

    /// Prefix for aliases inside correlated subqueries.
    pub subquery_alias_prefix: String,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            peek_ahead: false,
            max_relation_depth: 16,
            subquery_alias_prefix: "sub_".to_string(),
        }
    }
}

/// Result set settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResultSettings {
    /// Keep hydrated rows so the result set can be rewound.
    pub cache: bool,
}

impl Default for ResultSettings {
    fn default() -> Self {
        Self { cache: true }
    }
}

/// Database settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Path to a SQLite database (supports ${ENV_VAR} expansion).
    pub path: Option<String>,
}

impl DatabaseSettings {
    /// Get the database path with environment variables expanded.
    pub fn resolved_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.path
            .as_deref()
            .map(|p| expand_env_vars(p).map(PathBuf::from))
            .transpose()
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
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `RELORM_CONFIG`
    /// 2. `./relorm.toml`
    /// 3. `~/.config/relorm/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("RELORM_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("relorm.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("relorm").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.query.max_relation_depth == 0 {
            return Err(SettingsError::InvalidConfig(
                "query.max_relation_depth must be at least 1".to_string(),
            ));
        }
        if self.query.subquery_alias_prefix.is_empty() {
            return Err(SettingsError::InvalidConfig(
                "query.subquery_alias_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
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

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                var_name.push(ch);
            }
            if var_name.is_empty() {
                // Just a lone $, keep it
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}

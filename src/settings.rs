//! File-backed settings.
//!
//! Settings are the lowest-precedence layer: values from an optional TOML
//! file, falling back to built-in defaults. Environment variables override
//! them during [`crate::config::Config::resolve`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable naming the settings file.
pub const SETTINGS_PATH_ENV: &str = "WORKBIT_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS. Empty disables cross-origin access.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// `file`, `postgres` or `libsql`. Inferred from the other keys when unset.
    pub backend: Option<String>,
    pub url: Option<String>,
    pub pool_size: usize,
    pub libsql_path: Option<String>,
    pub libsql_url: Option<String>,
    pub data_file: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            backend: None,
            url: None,
            pool_size: 10,
            libsql_path: None,
            libsql_url: None,
            data_file: "data/store.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub supabase_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: String,
    /// Colour codes in pretty output.
    pub ansi: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            format: "pretty".to_string(),
            ansi: true,
        }
    }
}

impl Settings {
    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Settings {
            path: origin.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Load settings from `path`, or defaults when no path is given.
    ///
    /// An explicitly named file that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Settings {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&raw, path)
    }

    /// Settings path from `--config`, then `WORKBIT_CONFIG`.
    pub fn path_from(cli: Option<PathBuf>) -> Option<PathBuf> {
        cli.or_else(|| {
            std::env::var(SETTINGS_PATH_ENV)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
        })
    }
}

//! Runtime configuration.
//!
//! Precedence, highest first: environment (including `.env` via `dotenvy`),
//! the optional TOML settings file, built-in defaults.

mod helpers;

use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;
use crate::settings::Settings;

use helpers::{
    optional_env, parse_bool_env, parse_csv, parse_optional_env, parse_string_env, parse_u16_env,
    parse_usize_env,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load `.env`, read the settings file and apply environment overrides.
    pub fn load(settings_path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let settings = Settings::load(settings_path)?;
        Self::resolve(&settings)
    }

    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::resolve(settings)?,
            database: DatabaseConfig::resolve(settings)?,
            auth: AuthConfig::resolve(settings)?,
            logging: LoggingConfig::resolve(settings)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let allowed_origins = match optional_env("WORKBIT_ALLOWED_ORIGINS")? {
            Some(raw) => parse_csv(&raw),
            None => settings.server.allowed_origins.clone(),
        };
        Ok(Self {
            host: parse_string_env("WORKBIT_HOST", settings.server.host.clone())?,
            port: parse_u16_env("WORKBIT_PORT", settings.server.port)?,
            allowed_origins,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    File,
    Postgres,
    LibSql,
}

impl DatabaseBackend {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" | "json" => Ok(Self::File),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "libsql" | "sqlite" | "turso" => Ok(Self::LibSql),
            other => Err(ConfigError::InvalidValue {
                key: "DATABASE_BACKEND".to_string(),
                message: format!("unsupported backend '{other}'"),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Postgres => "postgres",
            Self::LibSql => "libsql",
        }
    }

    /// Pick a backend: an explicit choice wins, then a Postgres URL, then
    /// any libSQL setting, then the JSON file.
    pub fn select(
        explicit: Option<&str>,
        has_database_url: bool,
        has_libsql: bool,
    ) -> Result<Self, ConfigError> {
        if let Some(raw) = explicit {
            return Self::parse(raw);
        }
        Ok(if has_database_url {
            Self::Postgres
        } else if has_libsql {
            Self::LibSql
        } else {
            Self::File
        })
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: Option<SecretString>,
    pub pool_size: usize,
    pub libsql_path: Option<PathBuf>,
    pub libsql_url: Option<String>,
    pub libsql_auth_token: Option<SecretString>,
    pub data_file: PathBuf,
}

impl DatabaseConfig {
    fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let db = &settings.database;
        let url = parse_optional_env("DATABASE_URL", db.url.clone())?;
        let url = match (url, optional_env("DATABASE_PASSWORD")?) {
            (Some(url), Some(password)) => Some(with_password(&url, &password)?),
            (url, _) => url,
        };
        let libsql_path = parse_optional_env("LIBSQL_PATH", db.libsql_path.clone())?;
        let libsql_url = parse_optional_env("LIBSQL_URL", db.libsql_url.clone())?;
        let libsql_auth_token = optional_env("LIBSQL_AUTH_TOKEN")?.map(SecretString::from);
        let explicit = parse_optional_env("DATABASE_BACKEND", db.backend.clone())?;

        let backend = DatabaseBackend::select(
            explicit.as_deref(),
            url.is_some(),
            libsql_path.is_some() || libsql_url.is_some(),
        )?;

        let config = Self {
            backend,
            url: url.map(SecretString::from),
            pool_size: parse_usize_env("DATABASE_POOL_SIZE", db.pool_size)?,
            libsql_path: libsql_path.map(PathBuf::from),
            libsql_url,
            libsql_auth_token,
            data_file: PathBuf::from(parse_string_env(
                "WORKBIT_DATA_FILE",
                db.data_file.clone(),
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.backend {
            DatabaseBackend::Postgres if self.url.is_none() => Err(ConfigError::Missing {
                key: "DATABASE_URL".to_string(),
            }),
            DatabaseBackend::LibSql
                if self.libsql_url.is_some() && self.libsql_auth_token.is_none() =>
            {
                Err(ConfigError::Missing {
                    key: "LIBSQL_AUTH_TOKEN".to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Connection URL, if one is configured.
    pub fn url(&self) -> Option<&str> {
        self.url.as_ref().map(|url| url.expose_secret())
    }

    /// Configuration for a local JSON file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: DatabaseBackend::File,
            url: None,
            pool_size: 1,
            libsql_path: None,
            libsql_url: None,
            libsql_auth_token: None,
            data_file: path.into(),
        }
    }

    /// Configuration for a local libSQL database file.
    pub fn libsql_local(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: DatabaseBackend::LibSql,
            libsql_path: Some(path.into()),
            ..Self::file(PathBuf::new())
        }
    }
}

pub fn default_libsql_path() -> PathBuf {
    PathBuf::from("data/workbit.db")
}

fn with_password(raw: &str, password: &str) -> Result<String, ConfigError> {
    let mut url = url::Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
        key: "DATABASE_URL".to_string(),
        message: e.to_string(),
    })?;
    url.set_password(Some(password))
        .map_err(|()| ConfigError::InvalidValue {
            key: "DATABASE_URL".to_string(),
            message: "URL cannot carry a password".to_string(),
        })?;
    Ok(url.to_string())
}

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<SecretString>,
}

impl AuthConfig {
    fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let supabase_url = parse_optional_env("SUPABASE_URL", settings.auth.supabase_url.clone())?
            .map(|url| url.trim_end_matches('/').to_string());
        Ok(Self {
            supabase_url,
            supabase_anon_key: optional_env("SUPABASE_ANON_KEY")?.map(SecretString::from),
        })
    }

    /// Both the provider URL and its anon key are present.
    pub fn is_configured(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_anon_key.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub ansi: bool,
}

impl LoggingConfig {
    fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let raw = parse_string_env("LOG_FORMAT", settings.logging.format.clone())?;
        let format = match raw.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" | "text" | "" => LogFormat::Pretty,
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "LOG_FORMAT".to_string(),
                    message: format!("expected 'pretty' or 'json', got '{other}'"),
                });
            }
        };
        Ok(Self {
            format,
            ansi: parse_bool_env("LOG_ANSI", settings.logging.ansi)?,
        })
    }
}

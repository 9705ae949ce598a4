//! Error types shared across the crate.

use axum::http::StatusCode;
use thiserror::Error;

/// Configuration could not be resolved from settings and environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("missing required configuration: {key}")]
    Missing { key: String },

    #[error("failed to read settings file {path}: {reason}")]
    Settings { path: String, reason: String },
}

/// Persistence failures from any backend.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("{0} is not supported by the {1} backend")]
    Unsupported(&'static str, &'static str),
}

impl From<std::io::Error> for DatabaseError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for DatabaseError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::Query(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<deadpool_postgres::PoolError> for DatabaseError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

#[cfg(feature = "libsql")]
impl From<libsql::Error> for DatabaseError {
    fn from(err: libsql::Error) -> Self {
        Self::Query(err.to_string())
    }
}

/// Identity provider failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication is not configured")]
    NotConfigured,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("identity provider request failed: {0}")]
    Provider(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Provider(err.to_string())
    }
}

/// HTTP server lifecycle failures.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("server startup failed: {0}")]
    StartupFailed(String),
}

/// Error code attached to conflicts so callers can tell them apart.
pub const WORKSPACE_SLUG_TAKEN: &str = "WORKSPACE_SLUG_TAKEN";

/// Failures raised by the domain services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotConfigured(String),

    /// Domain failure without a dedicated status; surfaces as a 500.
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotConfigured(_) => StatusCode::NOT_IMPLEMENTED,
            Self::Failed(_) | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Out-of-band code for conflicts, `None` for every other variant.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Conflict { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NotConfigured => Self::NotConfigured(err.to_string()),
            AuthError::InvalidToken | AuthError::InvalidCredentials => {
                Self::Unauthorized(err.to_string())
            }
            AuthError::Provider(_) => Self::Failed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_http_statuses() {
        let cases = [
            (
                ServiceError::Validation("title is required".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::NotFound("Update not found".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                ServiceError::Conflict {
                    code: WORKSPACE_SLUG_TAKEN,
                    message: "Workspace URL is already reserved".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                ServiceError::NotConfigured("auth".into()),
                StatusCode::NOT_IMPLEMENTED,
            ),
            (
                ServiceError::Failed("Team not found".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ServiceError::Database(DatabaseError::Query("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{err}");
        }
    }

    #[test]
    fn conflict_code_is_only_set_for_conflicts() {
        let conflict = ServiceError::Conflict {
            code: WORKSPACE_SLUG_TAKEN,
            message: "Workspace URL is already reserved".into(),
        };
        assert_eq!(conflict.code(), Some(WORKSPACE_SLUG_TAKEN));
        assert_eq!(conflict.to_string(), "Workspace URL is already reserved");
        assert_eq!(ServiceError::NotFound("x".into()).code(), None);
    }

    #[test]
    fn auth_errors_convert_to_service_statuses() {
        assert_eq!(
            ServiceError::from(AuthError::NotConfigured).status_code(),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            ServiceError::from(AuthError::InvalidCredentials).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }
}

//! Request and response DTOs for the HTTP API.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::{DatabaseError, ServiceError};

// --- Errors ---

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

/// A service failure rendered as `{ "error": ..., "code"?: ... }`.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        Self(ServiceError::Database(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "Request failed");
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
            code: self.0.code(),
        };
        (status, Json(body)).into_response()
    }
}

/// A request body that failed JSON extraction. Keeps axum's status.
#[derive(Debug)]
pub struct InvalidBody(pub JsonRejection);

impl IntoResponse for InvalidBody {
    fn into_response(self) -> Response {
        tracing::debug!(status = self.0.status().as_u16(), error = %self.0, "Rejected request body");
        let body = ErrorResponse {
            error: self.0.body_text(),
            code: Some("INVALID_BODY"),
        };
        (self.0.status(), Json(body)).into_response()
    }
}

/// `Json<T>` for request bodies, rejecting with the API error envelope.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = InvalidBody;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(InvalidBody)?;
        Ok(Self(value))
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;
pub type Created<T> = Result<(StatusCode, Json<T>), ApiError>;

// --- Health ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: &'static str,
    pub auth_configured: bool,
    pub api_keys_enabled: bool,
    pub uptime_secs: u64,
}

// --- Auth ---

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub authenticated: bool,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<AuthUser>,
    pub auth_configured: bool,
}

// --- Queries ---

#[derive(Debug, Default, Deserialize)]
pub struct IssueListQuery {
    pub filter: Option<String>,
}

use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use crate::auth::AuthSession;
use crate::error::{AuthError, ServiceError};
use crate::service::required;
use crate::web::auth::Caller;
use crate::web::server::AppState;
use crate::web::types::{ApiError, ApiResult, JsonBody, LoginRequest, SessionResponse};

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> ApiResult<AuthSession> {
    let provider = state
        .auth
        .as_ref()
        .ok_or(ServiceError::from(AuthError::NotConfigured))?;
    let email = required("email", req.email.as_deref())?;
    let password = req
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ServiceError::Validation("password is required".to_string()))?;

    let session = provider
        .sign_in(&email, &password)
        .await
        .map_err(|e| ApiError(e.into()))?;
    tracing::info!(user_id = %session.user.id, "User signed in");
    Ok(Json(session))
}

pub async fn session_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Json<SessionResponse> {
    Json(SessionResponse {
        authenticated: caller.user.is_some(),
        user_id: caller.user_id,
        user: caller.user,
        auth_configured: state.auth.is_some(),
    })
}

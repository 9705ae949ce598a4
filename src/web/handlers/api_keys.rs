use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;

use crate::db::ApiKeyStore;
use crate::error::ServiceError;
use crate::service::api_keys::{self, ApiKeySummary, CreateApiKeyInput, CreatedApiKey};
use crate::web::auth::Caller;
use crate::web::server::AppState;
use crate::web::types::{ApiError, ApiResult, Created, JsonBody};

fn key_store(state: &AppState) -> Result<&dyn ApiKeyStore, ApiError> {
    state.api_keys.as_deref().ok_or_else(|| {
        ApiError(ServiceError::NotConfigured(
            "API keys require a database backend".to_string(),
        ))
    })
}

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<Vec<ApiKeySummary>> {
    let keys = api_keys::list_api_keys(key_store(&state)?, &caller.user_id).await?;
    Ok(Json(keys))
}

pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    JsonBody(input): JsonBody<CreateApiKeyInput>,
) -> Created<CreatedApiKey> {
    let created =
        api_keys::create_api_key(key_store(&state)?, &caller.user_id, input, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn revoke_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    api_keys::revoke_api_key(key_store(&state)?, &caller.user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::error::ServiceError;
use crate::model::Notification;
use crate::service::{me, notifications};
use crate::web::auth::Caller;
use crate::web::server::AppState;
use crate::web::types::{ApiError, ApiResult};

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<Vec<Notification>> {
    let store = state.store.get_store().await?;
    let member_id = me::member_id_for(&store, &caller.user_id);
    Ok(Json(notifications::list_notifications(&store, &member_id)))
}

pub async fn read_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Notification> {
    let notification = state
        .store
        .mutate(|store| {
            let member_id = me::member_id_for(store, &caller.user_id);
            notifications::mark_read(store, &member_id, &id)
        })
        .await?;
    Ok(Json(notification))
}

pub async fn read_all_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<StatusCode, ApiError> {
    let updated = state
        .store
        .mutate(|store| {
            let member_id = me::member_id_for(store, &caller.user_id);
            Ok::<_, ServiceError>(notifications::mark_all_read(store, &member_id))
        })
        .await?;
    tracing::debug!(updated, "Marked notifications read");
    Ok(StatusCode::NO_CONTENT)
}

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use chrono::Utc;

use crate::error::ServiceError;
use crate::service::issues::{self, IssueView};
use crate::service::me::{self, MeView};
use crate::web::auth::Caller;
use crate::web::server::AppState;
use crate::web::types::ApiResult;

/// Provision a member for an authenticated caller seen for the first time.
pub(crate) async fn ensure_caller_member(
    state: &AppState,
    caller: &Caller,
) -> Result<(), ServiceError> {
    let Some(user) = caller.user.as_ref() else {
        return Ok(());
    };
    let store = state.store.get_store().await?;
    if me::find_member(&store, &user.id).is_some() {
        return Ok(());
    }
    let now = Utc::now();
    state
        .store
        .mutate(|store| Ok::<_, ServiceError>(me::ensure_member(store, user, now)))
        .await?;
    Ok(())
}

pub async fn me_handler(State(state): State<Arc<AppState>>, caller: Caller) -> ApiResult<MeView> {
    ensure_caller_member(&state, &caller).await?;
    let store = state.store.get_store().await?;
    Ok(Json(me::me_view(&store, &caller.user_id)?))
}

pub async fn my_issues_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<Vec<IssueView>> {
    let store = state.store.get_store().await?;
    let member_id = me::member_id_for(&store, &caller.user_id);
    Ok(Json(issues::my_issues(&store, &member_id)))
}

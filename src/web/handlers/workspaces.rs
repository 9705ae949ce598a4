use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;

use crate::model::{Invitation, Member, Project, Role, Team, View, Workspace};
use crate::service::me;
use crate::service::workspace::{self, InviteMemberInput};
use crate::service::workspaces::{self, CreateWorkspaceInput};
use crate::web::auth::Caller;
use crate::web::handlers::me::ensure_caller_member;
use crate::web::server::AppState;
use crate::web::types::{ApiResult, Created, JsonBody};

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<Vec<Workspace>> {
    let store = state.store.get_store().await?;
    let member_id = me::member_id_for(&store, &caller.user_id);
    Ok(Json(workspaces::workspaces_for_member(&store, &member_id)))
}

pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    JsonBody(input): JsonBody<CreateWorkspaceInput>,
) -> Created<Workspace> {
    ensure_caller_member(&state, &caller).await?;
    let workspace = state
        .store
        .mutate(|store| {
            let creator = me::member_id_for(store, &caller.user_id);
            workspaces::create_workspace(store, input, &creator)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(workspace)))
}

pub async fn projects_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Project>> {
    let store = state.store.get_store().await?;
    Ok(Json(workspace::list_projects(&store, &id)?))
}

pub async fn teams_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Team>> {
    let store = state.store.get_store().await?;
    Ok(Json(workspace::list_teams(&store, &id)?))
}

pub async fn members_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Member>> {
    let store = state.store.get_store().await?;
    Ok(Json(workspace::list_members(&store, &id)?))
}

pub async fn views_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<View>> {
    let store = state.store.get_store().await?;
    Ok(Json(workspace::list_views(&store, &id)?))
}

pub async fn roles_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Role>> {
    let store = state.store.get_store().await?;
    Ok(Json(workspace::list_roles(&store, &id)?))
}

pub async fn invite_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<InviteMemberInput>,
) -> Created<Invitation> {
    let now = Utc::now();
    let invitation = state
        .store
        .mutate(|store| {
            let invited_by = me::find_member(store, &caller.user_id).map(|m| m.id.clone());
            workspace::invite_member(store, &id, input, invited_by.as_deref(), now)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(invitation)))
}

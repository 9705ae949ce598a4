use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;

use crate::model::{ActivityItem, Milestone, ProjectProperties, StatusUpdate, StatusUpdateComment, View};
use crate::service::me;
use crate::service::teams::{
    self, CreateCommentInput, CreateMilestoneInput, CreateStatusUpdateInput, PropertiesPatch,
    TeamProjectView, UpdateMilestoneInput,
};
use crate::web::auth::Caller;
use crate::web::server::AppState;
use crate::web::types::{ApiResult, Created, JsonBody};

pub async fn project_handler(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
) -> ApiResult<TeamProjectView> {
    let store = state.store.get_store().await?;
    Ok(Json(teams::team_project(&store, &team_id)?))
}

pub async fn list_updates_handler(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
) -> ApiResult<Vec<StatusUpdate>> {
    let store = state.store.get_store().await?;
    Ok(Json(teams::list_status_updates(&store, &team_id)?))
}

pub async fn create_update_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(team_id): Path<String>,
    JsonBody(input): JsonBody<CreateStatusUpdateInput>,
) -> Created<StatusUpdate> {
    let now = Utc::now();
    let update = state
        .store
        .mutate(|store| {
            let author = me::author_for(store, &caller.user_id);
            teams::create_status_update(store, &team_id, input, &author, now)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(update)))
}

pub async fn list_comments_handler(
    State(state): State<Arc<AppState>>,
    Path((team_id, update_id)): Path<(String, String)>,
) -> ApiResult<Vec<StatusUpdateComment>> {
    let store = state.store.get_store().await?;
    Ok(Json(teams::list_update_comments(&store, &team_id, &update_id)?))
}

pub async fn add_comment_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path((team_id, update_id)): Path<(String, String)>,
    JsonBody(input): JsonBody<CreateCommentInput>,
) -> Created<StatusUpdateComment> {
    let now = Utc::now();
    let comment = state
        .store
        .mutate(|store| {
            let author = me::author_for(store, &caller.user_id);
            teams::add_update_comment(store, &team_id, &update_id, input, &author, now)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn list_milestones_handler(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
) -> ApiResult<Vec<Milestone>> {
    let store = state.store.get_store().await?;
    Ok(Json(teams::list_milestones(&store, &team_id)?))
}

pub async fn create_milestone_handler(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
    JsonBody(input): JsonBody<CreateMilestoneInput>,
) -> Created<Milestone> {
    let now = Utc::now();
    let milestone = state
        .store
        .mutate(|store| teams::create_milestone(store, &team_id, input, now))
        .await?;
    Ok((StatusCode::CREATED, Json(milestone)))
}

pub async fn update_milestone_handler(
    State(state): State<Arc<AppState>>,
    Path((team_id, milestone_id)): Path<(String, String)>,
    JsonBody(patch): JsonBody<UpdateMilestoneInput>,
) -> ApiResult<Milestone> {
    let milestone = state
        .store
        .mutate(|store| teams::update_milestone(store, &team_id, &milestone_id, patch))
        .await?;
    Ok(Json(milestone))
}

pub async fn patch_properties_handler(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
    JsonBody(patch): JsonBody<PropertiesPatch>,
) -> ApiResult<ProjectProperties> {
    let now = Utc::now();
    let properties = state
        .store
        .mutate(|store| teams::patch_properties(store, &team_id, patch, now))
        .await?;
    Ok(Json(properties))
}

pub async fn views_handler(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
) -> ApiResult<Vec<View>> {
    let store = state.store.get_store().await?;
    Ok(Json(teams::list_team_views(&store, &team_id)?))
}

pub async fn logs_handler(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
) -> ApiResult<Vec<ActivityItem>> {
    let store = state.store.get_store().await?;
    Ok(Json(teams::team_logs(&store, &team_id)?))
}

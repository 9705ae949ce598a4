use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::Utc;

use crate::model::Issue;
use crate::service::issues::{self, CreateIssueInput, IssueFilter, IssueView, UpdateIssueInput};
use crate::service::me;
use crate::web::auth::Caller;
use crate::web::server::AppState;
use crate::web::types::{ApiResult, Created, IssueListQuery, JsonBody};

pub async fn team_issues_handler(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
    Query(query): Query<IssueListQuery>,
) -> ApiResult<Vec<IssueView>> {
    let filter = IssueFilter::parse(query.filter.as_deref())?;
    let store = state.store.get_store().await?;
    Ok(Json(issues::list_team_issues(&store, &team_id, filter)?))
}

pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    JsonBody(input): JsonBody<CreateIssueInput>,
) -> Created<Issue> {
    let now = Utc::now();
    let issue = state
        .store
        .mutate(|store| {
            let actor = me::member_id_for(store, &caller.user_id);
            issues::create_issue(store, input, &actor, now)
        })
        .await?;
    tracing::debug!(issue_id = %issue.id, team_id = %issue.team_id, "Issue created");
    Ok((StatusCode::CREATED, Json(issue)))
}

pub async fn get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<IssueView> {
    let store = state.store.get_store().await?;
    Ok(Json(issues::get_issue(&store, &id)?))
}

pub async fn update_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<UpdateIssueInput>,
) -> ApiResult<Issue> {
    let now = Utc::now();
    let issue = state
        .store
        .mutate(|store| {
            let actor = me::member_id_for(store, &caller.user_id);
            issues::update_issue(store, &id, patch, &actor, now)
        })
        .await?;
    Ok(Json(issue))
}

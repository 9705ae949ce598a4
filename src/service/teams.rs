//! Team-scoped project data: status updates, comments, milestones,
//! properties, views and the activity log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::model::{
    ActivityIcon, ActivityItem, Member, Milestone, Project, ProjectProperties, StatusUpdate,
    StatusUpdateComment, Store, Team, UpdateHealth, View,
};
use crate::service::{Author, double_option, new_id, newest_first, optional_text, required, timestamp};

/// Status updates shown on the team project page.
pub const RECENT_UPDATES_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamProjectView {
    pub team: Team,
    pub project: Option<Project>,
    pub properties: ProjectProperties,
    pub members: Vec<Member>,
    pub updates: Vec<StatusUpdate>,
    pub milestones: Vec<Milestone>,
    pub activity: Vec<ActivityItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStatusUpdateInput {
    pub status: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentInput {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMilestoneInput {
    pub name: Option<String>,
    pub progress: Option<i64>,
    pub total: Option<i64>,
    pub target_date: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMilestoneInput {
    pub name: Option<String>,
    pub progress: Option<i64>,
    pub total: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    pub target_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

/// Merge patch for project properties. Absent fields keep their value;
/// `null` clears the optional ones.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertiesPatch {
    pub status: Option<String>,
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub lead_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub start_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub end_date: Option<Option<String>>,
    pub team_ids: Option<Vec<String>>,
    pub label_ids: Option<Vec<String>>,
}

fn require_team<'a>(store: &'a Store, team_id: &str) -> Result<&'a Team, ServiceError> {
    store
        .team(team_id)
        .ok_or_else(|| ServiceError::NotFound("Team not found".to_string()))
}

fn properties_for(store: &Store, team_id: &str) -> ProjectProperties {
    store
        .project_properties_by_team
        .get(team_id)
        .cloned()
        .unwrap_or_else(|| ProjectProperties::default_for_team(team_id))
}

fn record_activity(
    store: &mut Store,
    team_id: &str,
    icon: ActivityIcon,
    message: String,
    now: DateTime<Utc>,
) {
    store.activity.push(ActivityItem {
        id: new_id("act"),
        team_id: team_id.to_string(),
        icon,
        message,
        date: timestamp(now),
    });
}

fn check_counts(progress: i64, total: i64) -> Result<(), ServiceError> {
    if progress < 0 || total < 0 {
        return Err(ServiceError::Validation(
            "progress and total must not be negative".to_string(),
        ));
    }
    Ok(())
}

/// Everything the team project page shows.
pub fn team_project(store: &Store, team_id: &str) -> Result<TeamProjectView, ServiceError> {
    let team = require_team(store, team_id)?;
    let project = team
        .project_id
        .as_deref()
        .and_then(|id| store.projects.iter().find(|p| p.id == id))
        .or_else(|| store.projects.iter().find(|p| p.team_id == team_id))
        .cloned();

    let mut updates = list_status_updates(store, team_id)?;
    updates.truncate(RECENT_UPDATES_LIMIT);

    Ok(TeamProjectView {
        team: team.clone(),
        project,
        properties: properties_for(store, team_id),
        members: store
            .members
            .iter()
            .filter(|m| team.member_ids.contains(&m.id) || m.team_ids.iter().any(|t| t == team_id))
            .cloned()
            .collect(),
        updates,
        milestones: list_milestones(store, team_id)?,
        activity: team_logs(store, team_id)?,
    })
}

/// All status updates for a team, newest first.
pub fn list_status_updates(
    store: &Store,
    team_id: &str,
) -> Result<Vec<StatusUpdate>, ServiceError> {
    require_team(store, team_id)?;
    let mut updates: Vec<StatusUpdate> = store
        .status_updates
        .iter()
        .filter(|u| u.team_id == team_id)
        .cloned()
        .collect();
    updates.sort_by(|a, b| newest_first(&a.created_at, &b.created_at));
    Ok(updates)
}

pub fn create_status_update(
    store: &mut Store,
    team_id: &str,
    input: CreateStatusUpdateInput,
    author: &Author,
    now: DateTime<Utc>,
) -> Result<StatusUpdate, ServiceError> {
    require_team(store, team_id)?;
    let content = required("content", input.content.as_deref())?;
    let health = match optional_text(input.status) {
        Some(raw) => UpdateHealth::parse(&raw).ok_or_else(|| {
            ServiceError::Validation(format!(
                "invalid status '{raw}', expected on-track, at-risk or off-track"
            ))
        })?,
        None => UpdateHealth::OnTrack,
    };

    let update = StatusUpdate {
        id: new_id("upd"),
        team_id: team_id.to_string(),
        status: health.as_str().to_string(),
        content,
        author_id: author.id.clone(),
        author_name: author.name.clone(),
        author_avatar_src: author.avatar_src.clone(),
        created_at: timestamp(now),
        comment_count: 0,
    };
    store.status_updates.push(update.clone());
    Ok(update)
}

fn find_update_index(store: &Store, team_id: &str, update_id: &str) -> Result<usize, ServiceError> {
    store
        .status_updates
        .iter()
        .position(|u| u.id == update_id && u.team_id == team_id)
        .ok_or_else(|| ServiceError::NotFound("Update not found".to_string()))
}

/// Comments on one update, oldest first.
pub fn list_update_comments(
    store: &Store,
    team_id: &str,
    update_id: &str,
) -> Result<Vec<StatusUpdateComment>, ServiceError> {
    find_update_index(store, team_id, update_id)?;
    let mut comments: Vec<StatusUpdateComment> = store
        .status_update_comments
        .iter()
        .filter(|c| c.update_id == update_id)
        .cloned()
        .collect();
    comments.sort_by(|a, b| newest_first(&b.timestamp, &a.timestamp));
    Ok(comments)
}

/// Add a comment and bump the parent's counter by one.
pub fn add_update_comment(
    store: &mut Store,
    team_id: &str,
    update_id: &str,
    input: CreateCommentInput,
    author: &Author,
    now: DateTime<Utc>,
) -> Result<StatusUpdateComment, ServiceError> {
    let index = find_update_index(store, team_id, update_id)?;
    let content = required("content", input.content.as_deref())?;

    let comment = StatusUpdateComment {
        id: new_id("cmt"),
        update_id: update_id.to_string(),
        author_id: author.id.clone(),
        author_name: author.name.clone(),
        author_avatar_src: author.avatar_src.clone(),
        content,
        timestamp: timestamp(now),
    };
    store.status_update_comments.push(comment.clone());
    store.status_updates[index].comment_count += 1;
    Ok(comment)
}

/// Milestones in insertion order.
pub fn list_milestones(store: &Store, team_id: &str) -> Result<Vec<Milestone>, ServiceError> {
    require_team(store, team_id)?;
    Ok(store
        .milestones
        .iter()
        .filter(|m| m.team_id == team_id)
        .cloned()
        .collect())
}

pub fn create_milestone(
    store: &mut Store,
    team_id: &str,
    input: CreateMilestoneInput,
    now: DateTime<Utc>,
) -> Result<Milestone, ServiceError> {
    require_team(store, team_id)?;
    let name = required("name", input.name.as_deref())?;
    let progress = input.progress.unwrap_or(0);
    let total = input.total.unwrap_or(0);
    check_counts(progress, total)?;

    let milestone = Milestone {
        id: new_id("ms"),
        team_id: team_id.to_string(),
        name,
        progress,
        total,
        target_date: optional_text(input.target_date),
        description: optional_text(input.description),
    };
    store.milestones.push(milestone.clone());
    record_activity(
        store,
        team_id,
        ActivityIcon::Milestone,
        format!("Milestone \"{}\" created", milestone.name),
        now,
    );
    Ok(milestone)
}

pub fn update_milestone(
    store: &mut Store,
    team_id: &str,
    milestone_id: &str,
    patch: UpdateMilestoneInput,
) -> Result<Milestone, ServiceError> {
    let index = store
        .milestones
        .iter()
        .position(|m| m.id == milestone_id && m.team_id == team_id)
        .ok_or_else(|| ServiceError::NotFound("Milestone not found".to_string()))?;

    let mut milestone = store.milestones[index].clone();
    if let Some(name) = patch.name {
        milestone.name = required("name", Some(&name))?;
    }
    if let Some(progress) = patch.progress {
        milestone.progress = progress;
    }
    if let Some(total) = patch.total {
        milestone.total = total;
    }
    check_counts(milestone.progress, milestone.total)?;
    if let Some(target_date) = patch.target_date {
        milestone.target_date = optional_text(target_date);
    }
    if let Some(description) = patch.description {
        milestone.description = optional_text(description);
    }

    store.milestones[index] = milestone.clone();
    Ok(milestone)
}

/// Merge `patch` over the stored (or default) properties and upsert them.
pub fn patch_properties(
    store: &mut Store,
    team_id: &str,
    patch: PropertiesPatch,
    now: DateTime<Utc>,
) -> Result<ProjectProperties, ServiceError> {
    require_team(store, team_id)?;
    let mut props = properties_for(store, team_id);
    let mut changed = Vec::new();

    if let Some(status) = optional_text(patch.status) {
        props.status = status;
        changed.push("status");
    }
    if let Some(priority) = optional_text(patch.priority) {
        props.priority = priority;
        changed.push("priority");
    }
    if let Some(lead_id) = patch.lead_id {
        props.lead_id = optional_text(lead_id);
        changed.push("lead");
    }
    if let Some(start_date) = patch.start_date {
        props.start_date = optional_text(start_date);
        changed.push("start date");
    }
    if let Some(end_date) = patch.end_date {
        props.end_date = optional_text(end_date);
        changed.push("end date");
    }
    if let Some(team_ids) = patch.team_ids {
        props.team_ids = team_ids;
        changed.push("teams");
    }
    if let Some(label_ids) = patch.label_ids {
        props.label_ids = label_ids;
        changed.push("labels");
    }

    store
        .project_properties_by_team
        .insert(team_id.to_string(), props.clone());
    if !changed.is_empty() {
        record_activity(
            store,
            team_id,
            ActivityIcon::Project,
            format!("Project {} updated", changed.join(", ")),
            now,
        );
    }
    Ok(props)
}

pub fn list_team_views(store: &Store, team_id: &str) -> Result<Vec<View>, ServiceError> {
    require_team(store, team_id)?;
    Ok(store
        .views
        .iter()
        .filter(|v| v.team_id.as_deref() == Some(team_id))
        .cloned()
        .collect())
}

/// Activity for a team, newest first, unbounded.
pub fn team_logs(store: &Store, team_id: &str) -> Result<Vec<ActivityItem>, ServiceError> {
    require_team(store, team_id)?;
    let mut items: Vec<ActivityItem> = store
        .activity
        .iter()
        .filter(|a| a.team_id == team_id)
        .cloned()
        .collect();
    items.sort_by(|a, b| newest_first(&a.date, &b.date));
    Ok(items)
}

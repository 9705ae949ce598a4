//! Row mappers between persisted rows and domain records.
//!
//! Row structs mirror the table columns exactly (snake_case, nullable
//! columns as `Option`). Conversions are structural: absent lists become
//! empty, absent counters zero, absent flags false.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::db::schema::{self, RowObject, TableRows, TableSpec};
use crate::error::DatabaseError;
use crate::model::{
    ActivityIcon, ActivityItem, Invitation, Issue, Member, Milestone, Notification, Project,
    ProjectProperties, Role, StatusUpdate, StatusUpdateComment, Store, Team, View, Workspace,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceRow {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub region: String,
    #[serde(default)]
    pub member_ids: Option<Vec<String>>,
}

impl From<&Workspace> for WorkspaceRow {
    fn from(ws: &Workspace) -> Self {
        Self {
            id: ws.id.clone(),
            name: ws.name.clone(),
            slug: ws.slug.clone(),
            region: ws.region.clone(),
            member_ids: Some(ws.member_ids.clone()),
        }
    }
}

impl From<WorkspaceRow> for Workspace {
    fn from(row: WorkspaceRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            region: row.region,
            member_ids: row.member_ids.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    #[serde(default)]
    pub workspace_id: Option<String>,
}

impl From<&Role> for RoleRow {
    fn from(role: &Role) -> Self {
        Self {
            id: role.id.clone(),
            name: role.name.clone(),
            description: role.description.clone(),
            permissions: Some(role.permissions.clone()),
            workspace_id: role.workspace_id.clone(),
        }
    }
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            permissions: row.permissions.unwrap_or_default(),
            workspace_id: row.workspace_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRow {
    pub id: String,
    pub name: String,
    pub username: String,
    #[serde(default)]
    pub avatar_src: Option<String>,
    pub status: String,
    #[serde(default)]
    pub joined: Option<String>,
    #[serde(default)]
    pub team_ids: Option<Vec<String>>,
    #[serde(default)]
    pub provisioned: Option<bool>,
    #[serde(default)]
    pub uid: Option<String>,
}

impl From<&Member> for MemberRow {
    fn from(member: &Member) -> Self {
        Self {
            id: member.id.clone(),
            name: member.name.clone(),
            username: member.username.clone(),
            avatar_src: member.avatar_src.clone(),
            status: member.status.clone(),
            joined: member.joined.clone(),
            team_ids: Some(member.team_ids.clone()),
            provisioned: Some(member.provisioned),
            uid: member.uid.clone(),
        }
    }
}

impl From<MemberRow> for Member {
    fn from(row: MemberRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            username: row.username,
            avatar_src: row.avatar_src,
            status: row.status,
            joined: row.joined,
            team_ids: row.team_ids.unwrap_or_default(),
            provisioned: row.provisioned.unwrap_or(false),
            uid: row.uid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub member_ids: Option<Vec<String>>,
    #[serde(default)]
    pub workspace_id: Option<String>,
}

impl From<&Team> for TeamRow {
    fn from(team: &Team) -> Self {
        Self {
            id: team.id.clone(),
            name: team.name.clone(),
            project_id: team.project_id.clone(),
            member_ids: Some(team.member_ids.clone()),
            workspace_id: team.workspace_id.clone(),
        }
    }
}

impl From<TeamRow> for Team {
    fn from(row: TeamRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            project_id: row.project_id,
            member_ids: row.member_ids.unwrap_or_default(),
            workspace_id: row.workspace_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRow {
    pub id: String,
    pub name: String,
    pub team_id: String,
    pub status: String,
    #[serde(default)]
    pub workspace_id: Option<String>,
}

impl From<&Project> for ProjectRow {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id.clone(),
            name: project.name.clone(),
            team_id: project.team_id.clone(),
            status: project.status.clone(),
            workspace_id: project.workspace_id.clone(),
        }
    }
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            team_id: row.team_id,
            status: row.status,
            workspace_id: row.workspace_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub filters: Option<serde_json::Value>,
}

impl From<&View> for ViewRow {
    fn from(view: &View) -> Self {
        Self {
            id: view.id.clone(),
            name: view.name.clone(),
            description: view.description.clone(),
            team_id: view.team_id.clone(),
            owner_id: view.owner_id.clone(),
            workspace_id: view.workspace_id.clone(),
            filters: view.filters.clone(),
        }
    }
}

impl From<ViewRow> for View {
    fn from(row: ViewRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            team_id: row.team_id,
            owner_id: row.owner_id,
            workspace_id: row.workspace_id,
            filters: row.filters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvitationRow {
    pub id: String,
    pub email: String,
    pub role: String,
    pub workspace_id: String,
    #[serde(default)]
    pub invited_by: Option<String>,
    pub status: String,
    pub created_at: String,
}

impl From<&Invitation> for InvitationRow {
    fn from(invite: &Invitation) -> Self {
        Self {
            id: invite.id.clone(),
            email: invite.email.clone(),
            role: invite.role.clone(),
            workspace_id: invite.workspace_id.clone(),
            invited_by: invite.invited_by.clone(),
            status: invite.status.clone(),
            created_at: invite.created_at.clone(),
        }
    }
}

impl From<InvitationRow> for Invitation {
    fn from(row: InvitationRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            role: row.role,
            workspace_id: row.workspace_id,
            invited_by: row.invited_by,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectPropertiesRow {
    pub team_id: String,
    pub status: String,
    pub priority: String,
    #[serde(default)]
    pub lead_id: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub team_ids: Option<Vec<String>>,
    #[serde(default)]
    pub label_ids: Option<Vec<String>>,
}

impl ProjectPropertiesRow {
    pub fn from_properties(team_id: &str, props: &ProjectProperties) -> Self {
        Self {
            team_id: team_id.to_string(),
            status: props.status.clone(),
            priority: props.priority.clone(),
            lead_id: props.lead_id.clone(),
            start_date: props.start_date.clone(),
            end_date: props.end_date.clone(),
            team_ids: Some(props.team_ids.clone()),
            label_ids: Some(props.label_ids.clone()),
        }
    }

    /// Split into the map key and the domain value.
    pub fn into_entry(self) -> (String, ProjectProperties) {
        (
            self.team_id,
            ProjectProperties {
                status: self.status,
                priority: self.priority,
                lead_id: self.lead_id,
                start_date: self.start_date,
                end_date: self.end_date,
                team_ids: self.team_ids.unwrap_or_default(),
                label_ids: self.label_ids.unwrap_or_default(),
            },
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdateRow {
    pub id: String,
    pub team_id: String,
    pub status: String,
    pub content: String,
    pub author_id: String,
    pub author_name: String,
    #[serde(default)]
    pub author_avatar_src: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub comment_count: Option<i64>,
}

impl From<&StatusUpdate> for StatusUpdateRow {
    fn from(update: &StatusUpdate) -> Self {
        Self {
            id: update.id.clone(),
            team_id: update.team_id.clone(),
            status: update.status.clone(),
            content: update.content.clone(),
            author_id: update.author_id.clone(),
            author_name: update.author_name.clone(),
            author_avatar_src: update.author_avatar_src.clone(),
            created_at: update.created_at.clone(),
            comment_count: Some(update.comment_count),
        }
    }
}

impl From<StatusUpdateRow> for StatusUpdate {
    fn from(row: StatusUpdateRow) -> Self {
        Self {
            id: row.id,
            team_id: row.team_id,
            status: row.status,
            content: row.content,
            author_id: row.author_id,
            author_name: row.author_name,
            author_avatar_src: row.author_avatar_src,
            created_at: row.created_at,
            comment_count: row.comment_count.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdateCommentRow {
    pub id: String,
    pub update_id: String,
    pub author_id: String,
    pub author_name: String,
    #[serde(default)]
    pub author_avatar_src: Option<String>,
    pub content: String,
    pub timestamp: String,
}

impl From<&StatusUpdateComment> for StatusUpdateCommentRow {
    fn from(comment: &StatusUpdateComment) -> Self {
        Self {
            id: comment.id.clone(),
            update_id: comment.update_id.clone(),
            author_id: comment.author_id.clone(),
            author_name: comment.author_name.clone(),
            author_avatar_src: comment.author_avatar_src.clone(),
            content: comment.content.clone(),
            timestamp: comment.timestamp.clone(),
        }
    }
}

impl From<StatusUpdateCommentRow> for StatusUpdateComment {
    fn from(row: StatusUpdateCommentRow) -> Self {
        Self {
            id: row.id,
            update_id: row.update_id,
            author_id: row.author_id,
            author_name: row.author_name,
            author_avatar_src: row.author_avatar_src,
            content: row.content,
            timestamp: row.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneRow {
    pub id: String,
    pub team_id: String,
    pub name: String,
    #[serde(default)]
    pub progress: Option<i64>,
    #[serde(default)]
    pub total: Option<i64>,
    #[serde(default)]
    pub target_date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<&Milestone> for MilestoneRow {
    fn from(milestone: &Milestone) -> Self {
        Self {
            id: milestone.id.clone(),
            team_id: milestone.team_id.clone(),
            name: milestone.name.clone(),
            progress: Some(milestone.progress),
            total: Some(milestone.total),
            target_date: milestone.target_date.clone(),
            description: milestone.description.clone(),
        }
    }
}

impl From<MilestoneRow> for Milestone {
    fn from(row: MilestoneRow) -> Self {
        Self {
            id: row.id,
            team_id: row.team_id,
            name: row.name,
            progress: row.progress.unwrap_or(0),
            total: row.total.unwrap_or(0),
            target_date: row.target_date,
            description: row.description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRow {
    pub id: String,
    pub team_id: String,
    pub icon: String,
    pub message: String,
    pub date: String,
}

impl From<&ActivityItem> for ActivityRow {
    fn from(item: &ActivityItem) -> Self {
        Self {
            id: item.id.clone(),
            team_id: item.team_id.clone(),
            icon: item.icon.as_str().to_string(),
            message: item.message.clone(),
            date: item.date.clone(),
        }
    }
}

impl TryFrom<ActivityRow> for ActivityItem {
    type Error = DatabaseError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        let icon = ActivityIcon::from_db_value(&row.icon).ok_or_else(|| {
            DatabaseError::Serialization(format!("invalid activity icon '{}'", row.icon))
        })?;
        Ok(Self {
            id: row.id,
            team_id: row.team_id,
            icon,
            message: row.message,
            date: row.date,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRow {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub assignee_name: Option<String>,
    pub date: String,
    pub status: String,
    pub team_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<&Issue> for IssueRow {
    fn from(issue: &Issue) -> Self {
        Self {
            id: issue.id.clone(),
            title: issue.title.clone(),
            assignee_id: issue.assignee_id.clone(),
            assignee_name: issue.assignee_name.clone(),
            date: issue.date.clone(),
            status: issue.status.clone(),
            team_id: issue.team_id.clone(),
            project_id: issue.project_id.clone(),
            description: issue.description.clone(),
        }
    }
}

impl From<IssueRow> for Issue {
    fn from(row: IssueRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            assignee_id: row.assignee_id,
            assignee_name: row.assignee_name,
            date: row.date,
            status: row.status,
            team_id: row.team_id,
            project_id: row.project_id,
            description: row.description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub read: Option<bool>,
    pub created_at: String,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub actor_name: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
}

impl From<&Notification> for NotificationRow {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id.clone(),
            user_id: n.user_id.clone(),
            kind: n.kind.clone(),
            title: n.title.clone(),
            body: n.body.clone(),
            read: Some(n.read),
            created_at: n.created_at.clone(),
            actor_id: n.actor_id.clone(),
            actor_name: n.actor_name.clone(),
            target_url: n.target_url.clone(),
        }
    }
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            kind: row.kind,
            title: row.title,
            body: row.body,
            read: row.read.unwrap_or(false),
            created_at: row.created_at,
            actor_id: row.actor_id,
            actor_name: row.actor_name,
            target_url: row.target_url,
        }
    }
}

// ==================== Aggregate ====================

fn to_objects<R: Serialize>(
    table: &TableSpec,
    rows: impl Iterator<Item = R>,
) -> Result<Vec<RowObject>, DatabaseError> {
    rows.map(|row| match serde_json::to_value(row)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(DatabaseError::Serialization(format!(
            "{} row serialized to {}",
            table.name, other
        ))),
    })
    .collect()
}

fn from_objects<R: DeserializeOwned>(
    table: &TableSpec,
    tables: &mut TableRows,
) -> Result<Vec<R>, DatabaseError> {
    tables
        .remove(table.name)
        .unwrap_or_default()
        .into_iter()
        .map(|object| {
            serde_json::from_value(serde_json::Value::Object(object))
                .map_err(|e| DatabaseError::Serialization(format!("{}: {}", table.name, e)))
        })
        .collect()
}

/// Flatten the aggregate into per-table rows.
pub fn store_to_tables(store: &Store) -> Result<TableRows, DatabaseError> {
    let mut tables = TableRows::new();
    tables.insert(
        schema::WORKSPACES.name,
        to_objects(&schema::WORKSPACES, store.workspaces.iter().map(WorkspaceRow::from))?,
    );
    tables.insert(
        schema::ROLES.name,
        to_objects(&schema::ROLES, store.roles.iter().map(RoleRow::from))?,
    );
    tables.insert(
        schema::MEMBERS.name,
        to_objects(&schema::MEMBERS, store.members.iter().map(MemberRow::from))?,
    );
    tables.insert(
        schema::TEAMS.name,
        to_objects(&schema::TEAMS, store.teams.iter().map(TeamRow::from))?,
    );
    tables.insert(
        schema::PROJECTS.name,
        to_objects(&schema::PROJECTS, store.projects.iter().map(ProjectRow::from))?,
    );
    tables.insert(
        schema::VIEWS.name,
        to_objects(&schema::VIEWS, store.views.iter().map(ViewRow::from))?,
    );
    tables.insert(
        schema::INVITATIONS.name,
        to_objects(
            &schema::INVITATIONS,
            store.invitations.iter().map(InvitationRow::from),
        )?,
    );
    tables.insert(
        schema::PROJECT_PROPERTIES.name,
        to_objects(
            &schema::PROJECT_PROPERTIES,
            store
                .project_properties_by_team
                .iter()
                .map(|(team_id, props)| ProjectPropertiesRow::from_properties(team_id, props)),
        )?,
    );
    tables.insert(
        schema::STATUS_UPDATES.name,
        to_objects(
            &schema::STATUS_UPDATES,
            store.status_updates.iter().map(StatusUpdateRow::from),
        )?,
    );
    tables.insert(
        schema::STATUS_UPDATE_COMMENTS.name,
        to_objects(
            &schema::STATUS_UPDATE_COMMENTS,
            store
                .status_update_comments
                .iter()
                .map(StatusUpdateCommentRow::from),
        )?,
    );
    tables.insert(
        schema::MILESTONES.name,
        to_objects(&schema::MILESTONES, store.milestones.iter().map(MilestoneRow::from))?,
    );
    tables.insert(
        schema::ACTIVITY.name,
        to_objects(&schema::ACTIVITY, store.activity.iter().map(ActivityRow::from))?,
    );
    tables.insert(
        schema::ISSUES.name,
        to_objects(&schema::ISSUES, store.issues.iter().map(IssueRow::from))?,
    );
    tables.insert(
        schema::NOTIFICATIONS.name,
        to_objects(
            &schema::NOTIFICATIONS,
            store.notifications.iter().map(NotificationRow::from),
        )?,
    );
    Ok(tables)
}

/// Rebuild the aggregate from per-table rows. Missing tables read as empty.
pub fn store_from_tables(mut tables: TableRows) -> Result<Store, DatabaseError> {
    let workspaces: Vec<WorkspaceRow> = from_objects(&schema::WORKSPACES, &mut tables)?;
    let roles: Vec<RoleRow> = from_objects(&schema::ROLES, &mut tables)?;
    let members: Vec<MemberRow> = from_objects(&schema::MEMBERS, &mut tables)?;
    let teams: Vec<TeamRow> = from_objects(&schema::TEAMS, &mut tables)?;
    let projects: Vec<ProjectRow> = from_objects(&schema::PROJECTS, &mut tables)?;
    let views: Vec<ViewRow> = from_objects(&schema::VIEWS, &mut tables)?;
    let invitations: Vec<InvitationRow> = from_objects(&schema::INVITATIONS, &mut tables)?;
    let properties: Vec<ProjectPropertiesRow> =
        from_objects(&schema::PROJECT_PROPERTIES, &mut tables)?;
    let updates: Vec<StatusUpdateRow> = from_objects(&schema::STATUS_UPDATES, &mut tables)?;
    let comments: Vec<StatusUpdateCommentRow> =
        from_objects(&schema::STATUS_UPDATE_COMMENTS, &mut tables)?;
    let milestones: Vec<MilestoneRow> = from_objects(&schema::MILESTONES, &mut tables)?;
    let activity: Vec<ActivityRow> = from_objects(&schema::ACTIVITY, &mut tables)?;
    let issues: Vec<IssueRow> = from_objects(&schema::ISSUES, &mut tables)?;
    let notifications: Vec<NotificationRow> =
        from_objects(&schema::NOTIFICATIONS, &mut tables)?;

    Ok(Store {
        workspaces: workspaces.into_iter().map(Workspace::from).collect(),
        projects: projects.into_iter().map(Project::from).collect(),
        teams: teams.into_iter().map(Team::from).collect(),
        members: members.into_iter().map(Member::from).collect(),
        views: views.into_iter().map(View::from).collect(),
        roles: roles.into_iter().map(Role::from).collect(),
        invitations: invitations.into_iter().map(Invitation::from).collect(),
        status_updates: updates.into_iter().map(StatusUpdate::from).collect(),
        status_update_comments: comments
            .into_iter()
            .map(StatusUpdateComment::from)
            .collect(),
        project_properties_by_team: properties
            .into_iter()
            .map(ProjectPropertiesRow::into_entry)
            .collect(),
        milestones: milestones.into_iter().map(Milestone::from).collect(),
        activity: activity
            .into_iter()
            .map(ActivityItem::try_from)
            .collect::<Result<_, _>>()?,
        issues: issues.into_iter().map(Issue::from).collect(),
        notifications: notifications.into_iter().map(Notification::from).collect(),
    })
}

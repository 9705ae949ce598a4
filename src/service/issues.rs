use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::model::{Issue, Notification, Store};
use crate::service::{MemberSummary, date_only, double_option, new_id, optional_text, required, timestamp};

pub const DEFAULT_ISSUE_STATUS: &str = "todo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IssueFilter {
    #[default]
    All,
    /// Neither backlog nor done.
    Active,
    Backlog,
}

impl IssueFilter {
    /// Parse the `filter` query value. Missing means `all`.
    pub fn parse(raw: Option<&str>) -> Result<Self, ServiceError> {
        match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("all") => Ok(Self::All),
            Some("active") => Ok(Self::Active),
            Some("backlog") => Ok(Self::Backlog),
            Some(other) => Err(ServiceError::Validation(format!(
                "unknown filter '{other}', expected all, active or backlog"
            ))),
        }
    }

    pub fn matches(self, status: &str) -> bool {
        match self {
            Self::All => true,
            Self::Active => status != "backlog" && status != "done",
            Self::Backlog => status == "backlog",
        }
    }
}

/// An issue joined with its team name and assignee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueView {
    #[serde(flatten)]
    pub issue: Issue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<MemberSummary>,
}

impl IssueView {
    fn build(store: &Store, issue: &Issue) -> Self {
        Self {
            issue: issue.clone(),
            team_name: store.team(&issue.team_id).map(|team| team.name.clone()),
            assignee: issue
                .assignee_id
                .as_deref()
                .and_then(|id| store.member(id))
                .map(MemberSummary::from),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIssueInput {
    pub title: Option<String>,
    pub team_id: Option<String>,
    pub status: Option<String>,
    pub assignee_id: Option<String>,
    pub project_id: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIssueInput {
    pub title: Option<String>,
    pub status: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub assignee_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

pub fn list_team_issues(
    store: &Store,
    team_id: &str,
    filter: IssueFilter,
) -> Result<Vec<IssueView>, ServiceError> {
    if store.team(team_id).is_none() {
        return Err(ServiceError::NotFound("Team not found".to_string()));
    }
    Ok(store
        .issues
        .iter()
        .filter(|issue| issue.team_id == team_id && filter.matches(&issue.status))
        .map(|issue| IssueView::build(store, issue))
        .collect())
}

/// Issues assigned to `member_id`, in store order.
pub fn my_issues(store: &Store, member_id: &str) -> Vec<IssueView> {
    store
        .issues
        .iter()
        .filter(|issue| issue.assignee_id.as_deref() == Some(member_id))
        .map(|issue| IssueView::build(store, issue))
        .collect()
}

pub fn get_issue(store: &Store, issue_id: &str) -> Result<IssueView, ServiceError> {
    store
        .issues
        .iter()
        .find(|issue| issue.id == issue_id)
        .map(|issue| IssueView::build(store, issue))
        .ok_or_else(|| ServiceError::NotFound("Issue not found".to_string()))
}

fn next_issue_id(store: &Store, now: DateTime<Utc>) -> String {
    let mut millis = now.timestamp_millis();
    loop {
        let candidate = format!("ISS-{millis}");
        if !store.issues.iter().any(|issue| issue.id == candidate) {
            return candidate;
        }
        millis += 1;
    }
}

/// Create an issue for an existing team.
///
/// An unknown team is a plain failure, not a not-found: callers see a 500.
pub fn create_issue(
    store: &mut Store,
    input: CreateIssueInput,
    actor_id: &str,
    now: DateTime<Utc>,
) -> Result<Issue, ServiceError> {
    let title = required("title", input.title.as_deref())?;
    let team_id = required("teamId", input.team_id.as_deref())?;
    let team = store
        .team(&team_id)
        .ok_or_else(|| ServiceError::Failed("Team not found".to_string()))?;

    let assignee_id = optional_text(input.assignee_id);
    let assignee_name = assignee_id
        .as_deref()
        .and_then(|id| store.member(id))
        .map(|member| member.name.clone());

    let issue = Issue {
        id: next_issue_id(store, now),
        title,
        assignee_id,
        assignee_name,
        date: optional_text(input.date).unwrap_or_else(|| date_only(now)),
        status: optional_text(input.status).unwrap_or_else(|| DEFAULT_ISSUE_STATUS.to_string()),
        project_id: optional_text(input.project_id).or_else(|| team.project_id.clone()),
        team_id,
        description: optional_text(input.description),
    };

    notify_assignee(store, &issue, actor_id, now);
    store.issues.push(issue.clone());
    Ok(issue)
}

pub fn update_issue(
    store: &mut Store,
    issue_id: &str,
    patch: UpdateIssueInput,
    actor_id: &str,
    now: DateTime<Utc>,
) -> Result<Issue, ServiceError> {
    let index = store
        .issues
        .iter()
        .position(|issue| issue.id == issue_id)
        .ok_or_else(|| ServiceError::NotFound("Issue not found".to_string()))?;

    let mut issue = store.issues[index].clone();
    if let Some(title) = patch.title {
        issue.title = required("title", Some(&title))?;
    }
    if let Some(status) = patch.status {
        issue.status = required("status", Some(&status))?;
    }
    if let Some(description) = patch.description {
        issue.description = optional_text(description);
    }
    let reassigned = match patch.assignee_id {
        Some(assignee) => {
            let assignee = optional_text(assignee);
            let changed = assignee != issue.assignee_id;
            issue.assignee_name = assignee
                .as_deref()
                .and_then(|id| store.member(id))
                .map(|member| member.name.clone());
            issue.assignee_id = assignee;
            changed
        }
        None => false,
    };

    if reassigned {
        notify_assignee(store, &issue, actor_id, now);
    }
    store.issues[index] = issue.clone();
    Ok(issue)
}

/// Tell the assignee about an assignment made by somebody else.
fn notify_assignee(store: &mut Store, issue: &Issue, actor_id: &str, now: DateTime<Utc>) {
    let Some(assignee_id) = issue.assignee_id.as_deref() else {
        return;
    };
    if assignee_id == actor_id {
        return;
    }
    let actor_name = store.member(actor_id).map(|member| member.name.clone());
    store.notifications.push(Notification {
        id: new_id("ntf"),
        user_id: assignee_id.to_string(),
        kind: "issue-assigned".to_string(),
        title: format!("Assigned: {}", issue.title),
        body: match &actor_name {
            Some(name) => format!("{name} assigned {} to you", issue.id),
            None => format!("{} was assigned to you", issue.id),
        },
        read: false,
        created_at: timestamp(now),
        actor_id: Some(actor_id.to_string()),
        actor_name,
        target_url: Some(format!("/issues/{}", issue.id)),
    });
}

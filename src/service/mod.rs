//! Domain services.
//!
//! Functions here operate on a borrowed `Store`: readers take `&Store`,
//! mutations take `&mut Store` and are run by handlers inside
//! [`crate::store::StoreHandle::mutate`]. Nothing in this module performs I/O
//! except [`api_keys`], which talks to an `ApiKeyStore`.

pub mod api_keys;
pub mod issues;
pub mod me;
pub mod notifications;
pub mod teams;
pub mod workspace;
pub mod workspaces;

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ServiceError;
use crate::model::Member;

/// Author details copied onto status updates and comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_src: Option<String>,
}

impl From<&Member> for Author {
    fn from(member: &Member) -> Self {
        Self {
            id: member.id.clone(),
            name: member.name.clone(),
            avatar_src: member.avatar_src.clone(),
        }
    }
}

/// Compact member shape embedded in other views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummary {
    pub id: String,
    pub name: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_src: Option<String>,
}

impl From<&Member> for MemberSummary {
    fn from(member: &Member) -> Self {
        Self {
            id: member.id.clone(),
            name: member.name.clone(),
            username: member.username.clone(),
            avatar_src: member.avatar_src.clone(),
        }
    }
}

pub(crate) fn new_id(prefix: &str) -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &raw[..12])
}

pub(crate) fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn date_only(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Descending time order. Unparseable values sort after every parsed one,
/// in descending string order among themselves.
pub(crate) fn newest_first(a: &str, b: &str) -> Ordering {
    match (parse_instant(a), parse_instant(b)) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => b.cmp(a),
    }
}

/// Trimmed, non-empty value of a required input field.
pub(crate) fn required(field: &str, value: Option<&str>) -> Result<String, ServiceError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ServiceError::Validation(format!("{field} is required")))
}

/// Trimmed optional text; blanks become `None`.
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Distinguish an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in patch bodies.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! A small workspace shared by the service tests.

    use std::collections::BTreeMap;

    use chrono::{DateTime, TimeZone, Utc};

    use crate::model::{
        Issue, Member, Notification, Project, StatusUpdate, Store, Team, View, Workspace,
    };

    pub(crate) fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_767_225_600 + secs, 0)
            .single()
            .expect("valid timestamp")
    }

    pub(crate) fn member(id: &str, name: &str, uid: Option<&str>) -> Member {
        Member {
            id: id.into(),
            name: name.into(),
            username: name.to_ascii_lowercase(),
            avatar_src: None,
            status: "Member".into(),
            joined: Some("2025-12-01".into()),
            team_ids: vec!["team-product".into()],
            provisioned: false,
            uid: uid.map(str::to_string),
        }
    }

    pub(crate) fn issue(id: &str, status: &str, assignee: Option<&str>) -> Issue {
        Issue {
            id: id.into(),
            title: format!("Issue {id}"),
            assignee_id: assignee.map(str::to_string),
            assignee_name: None,
            date: "2026-01-02".into(),
            status: status.into(),
            team_id: "team-product".into(),
            project_id: Some("proj-app".into()),
            description: None,
        }
    }

    pub(crate) fn store() -> Store {
        Store {
            workspaces: vec![Workspace {
                id: "ws-acme".into(),
                name: "Acme".into(),
                slug: "acme".into(),
                region: "eu-west-1".into(),
                member_ids: vec!["m-ana".into(), "m-bo".into()],
            }],
            projects: vec![
                Project {
                    id: "proj-app".into(),
                    name: "App".into(),
                    team_id: "team-product".into(),
                    status: "in-progress".into(),
                    workspace_id: Some("ws-acme".into()),
                },
                Project {
                    id: "proj-other".into(),
                    name: "Elsewhere".into(),
                    team_id: "team-other".into(),
                    status: "planned".into(),
                    workspace_id: Some("ws-other".into()),
                },
            ],
            teams: vec![
                Team {
                    id: "team-product".into(),
                    name: "Product".into(),
                    project_id: Some("proj-app".into()),
                    member_ids: vec!["m-ana".into(), "m-bo".into()],
                    workspace_id: Some("ws-acme".into()),
                },
                Team {
                    id: "team-design".into(),
                    name: "Design".into(),
                    project_id: None,
                    member_ids: vec!["m-bo".into()],
                    workspace_id: None,
                },
            ],
            members: vec![
                member("m-ana", "Ana", Some("auth-ana")),
                member("m-bo", "Bo", None),
            ],
            views: vec![View {
                id: "view-open".into(),
                name: "Open".into(),
                description: None,
                team_id: Some("team-product".into()),
                owner_id: Some("m-ana".into()),
                workspace_id: Some("ws-acme".into()),
                filters: None,
            }],
            status_updates: vec![StatusUpdate {
                id: "upd-1".into(),
                team_id: "team-product".into(),
                status: "on-track".into(),
                content: "Kickoff done".into(),
                author_id: "m-ana".into(),
                author_name: "Ana".into(),
                author_avatar_src: None,
                created_at: "2026-01-03T10:00:00.000Z".into(),
                comment_count: 2,
            }],
            issues: vec![
                issue("ISS-1", "backlog", None),
                issue("ISS-2", "todo", Some("m-bo")),
                issue("ISS-3", "in progress", Some("m-ana")),
                issue("ISS-4", "done", Some("m-bo")),
            ],
            notifications: vec![
                Notification {
                    id: "n-1".into(),
                    user_id: "m-bo".into(),
                    kind: "mention".into(),
                    title: "Mentioned".into(),
                    body: "b".into(),
                    read: false,
                    created_at: "2026-01-01T08:00:00.000Z".into(),
                    actor_id: None,
                    actor_name: None,
                    target_url: None,
                },
                Notification {
                    id: "n-2".into(),
                    user_id: "m-bo".into(),
                    kind: "assigned".into(),
                    title: "Assigned".into(),
                    body: "b".into(),
                    read: false,
                    created_at: "2026-01-04T08:00:00.000Z".into(),
                    actor_id: None,
                    actor_name: None,
                    target_url: None,
                },
                Notification {
                    id: "n-3".into(),
                    user_id: "m-ana".into(),
                    kind: "assigned".into(),
                    title: "For Ana".into(),
                    body: "b".into(),
                    read: false,
                    created_at: "2026-01-05T08:00:00.000Z".into(),
                    actor_id: None,
                    actor_name: None,
                    target_url: None,
                },
            ],
            project_properties_by_team: BTreeMap::new(),
            ..Store::default()
        }
    }
}

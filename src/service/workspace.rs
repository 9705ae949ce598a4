//! Workspace-scoped listings and invitations.
//!
//! Records without a `workspace_id` predate workspaces and are visible in
//! every workspace.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::ServiceError;
use crate::model::{Invitation, Member, Project, Role, Store, Team, View, Workspace};
use crate::service::{new_id, optional_text, timestamp};

pub const DEFAULT_INVITE_ROLE: &str = "Member";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteMemberInput {
    pub email: Option<String>,
    pub role: Option<String>,
}

fn require_workspace<'a>(store: &'a Store, workspace_id: &str) -> Result<&'a Workspace, ServiceError> {
    store
        .workspace(workspace_id)
        .ok_or_else(|| ServiceError::NotFound("Workspace not found".to_string()))
}

fn in_workspace(record: Option<&str>, workspace_id: &str) -> bool {
    record.is_none_or(|id| id == workspace_id)
}

pub fn list_projects(store: &Store, workspace_id: &str) -> Result<Vec<Project>, ServiceError> {
    require_workspace(store, workspace_id)?;
    Ok(store
        .projects
        .iter()
        .filter(|p| in_workspace(p.workspace_id.as_deref(), workspace_id))
        .cloned()
        .collect())
}

pub fn list_teams(store: &Store, workspace_id: &str) -> Result<Vec<Team>, ServiceError> {
    require_workspace(store, workspace_id)?;
    Ok(store
        .teams
        .iter()
        .filter(|t| in_workspace(t.workspace_id.as_deref(), workspace_id))
        .cloned()
        .collect())
}

/// Members listed on the workspace, in the workspace's order.
pub fn list_members(store: &Store, workspace_id: &str) -> Result<Vec<Member>, ServiceError> {
    let workspace = require_workspace(store, workspace_id)?;
    Ok(workspace
        .member_ids
        .iter()
        .filter_map(|id| store.member(id))
        .cloned()
        .collect())
}

pub fn list_views(store: &Store, workspace_id: &str) -> Result<Vec<View>, ServiceError> {
    require_workspace(store, workspace_id)?;
    Ok(store
        .views
        .iter()
        .filter(|v| in_workspace(v.workspace_id.as_deref(), workspace_id))
        .cloned()
        .collect())
}

pub fn list_roles(store: &Store, workspace_id: &str) -> Result<Vec<Role>, ServiceError> {
    require_workspace(store, workspace_id)?;
    Ok(store
        .roles
        .iter()
        .filter(|r| in_workspace(r.workspace_id.as_deref(), workspace_id))
        .cloned()
        .collect())
}

/// Record a pending invitation. Re-inviting a pending address returns the
/// existing invitation.
pub fn invite_member(
    store: &mut Store,
    workspace_id: &str,
    input: InviteMemberInput,
    invited_by: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Invitation, ServiceError> {
    require_workspace(store, workspace_id)?;
    let email = optional_text(input.email)
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| e.contains('@'))
        .ok_or_else(|| ServiceError::Validation("A valid email is required".to_string()))?;

    if let Some(existing) = store.invitations.iter().find(|inv| {
        inv.workspace_id == workspace_id && inv.email == email && inv.status == "pending"
    }) {
        return Ok(existing.clone());
    }

    let invitation = Invitation {
        id: new_id("inv"),
        email,
        role: optional_text(input.role).unwrap_or_else(|| DEFAULT_INVITE_ROLE.to_string()),
        workspace_id: workspace_id.to_string(),
        invited_by: invited_by.map(str::to_string),
        status: "pending".to_string(),
        created_at: timestamp(now),
    };
    store.invitations.push(invitation.clone());
    Ok(invitation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::fixtures::{at, store};

    #[test]
    fn listings_include_unscoped_records() {
        let store = store();
        let projects = list_projects(&store, "ws-acme").expect("projects");
        assert_eq!(projects.len(), 1, "proj-other belongs to another workspace");

        let teams: Vec<String> = list_teams(&store, "ws-acme")
            .expect("teams")
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(teams, vec!["team-product", "team-design"]);
    }

    #[test]
    fn members_follow_workspace_membership() {
        let store = store();
        let names: Vec<String> = list_members(&store, "ws-acme")
            .expect("members")
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["Ana", "Bo"]);
    }

    #[test]
    fn unknown_workspace_is_not_found() {
        let store = store();
        for result in [
            list_views(&store, "ws-x").map(|_| ()),
            list_roles(&store, "ws-x").map(|_| ()),
            list_members(&store, "ws-x").map(|_| ()),
        ] {
            let err = result.expect_err("unknown workspace");
            assert_eq!(err.to_string(), "Workspace not found");
        }
    }

    #[test]
    fn invite_validates_email_and_defaults_role() {
        let mut store = store();
        let err = invite_member(
            &mut store,
            "ws-acme",
            InviteMemberInput {
                email: Some("not-an-email".into()),
                role: None,
            },
            None,
            at(0),
        )
        .expect_err("bad email");
        assert_eq!(err.status_code().as_u16(), 400);

        let invite = invite_member(
            &mut store,
            "ws-acme",
            InviteMemberInput {
                email: Some(" Cy@Example.com ".into()),
                role: None,
            },
            Some("m-ana"),
            at(0),
        )
        .expect("invite");
        assert_eq!(invite.email, "cy@example.com");
        assert_eq!(invite.role, DEFAULT_INVITE_ROLE);
        assert_eq!(invite.status, "pending");
        assert_eq!(invite.invited_by.as_deref(), Some("m-ana"));
    }

    #[test]
    fn reinviting_returns_pending_invitation() {
        let mut store = store();
        let input = InviteMemberInput {
            email: Some("cy@example.com".into()),
            role: Some("Admin".into()),
        };
        let first = invite_member(&mut store, "ws-acme", input.clone(), None, at(0)).expect("first");
        let second = invite_member(&mut store, "ws-acme", input, None, at(5)).expect("second");
        assert_eq!(first.id, second.id);
        assert_eq!(store.invitations.len(), 1);
    }
}

//! The calling user: member binding, provisioning and the `/me` view.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::error::ServiceError;
use crate::model::{Member, Store, Team, Workspace};
use crate::service::workspaces::workspaces_for_member;
use crate::service::{Author, date_only, new_id};

/// Caller id used when nothing identifies the request.
pub const DEFAULT_USER_ID: &str = "current-user";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeView {
    pub member: Member,
    pub teams: Vec<Team>,
    pub workspaces: Vec<Workspace>,
}

/// Member bound to `user_id`, matching the auth subject first, then the id.
pub fn find_member<'a>(store: &'a Store, user_id: &str) -> Option<&'a Member> {
    store
        .members
        .iter()
        .find(|m| m.uid.as_deref() == Some(user_id))
        .or_else(|| store.member(user_id))
}

pub fn member_id_for(store: &Store, user_id: &str) -> String {
    find_member(store, user_id)
        .map(|m| m.id.clone())
        .unwrap_or_else(|| user_id.to_string())
}

/// Author details for content written by `user_id`. Unbound callers are
/// credited under their raw id.
pub fn author_for(store: &Store, user_id: &str) -> Author {
    match find_member(store, user_id) {
        Some(member) => Author::from(member),
        None => Author {
            id: user_id.to_string(),
            name: if user_id == DEFAULT_USER_ID {
                "You".to_string()
            } else {
                user_id.to_string()
            },
            avatar_src: None,
        },
    }
}

fn display_name(user: &AuthUser) -> String {
    user.name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .or_else(|| {
            user.email
                .as_deref()
                .and_then(|e| e.split('@').next())
                .filter(|local| !local.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "New member".to_string())
}

/// Return the member bound to `user`, creating one the first time an
/// authenticated principal is seen. The flag is true when a record was added.
pub fn ensure_member(store: &mut Store, user: &AuthUser, now: DateTime<Utc>) -> (Member, bool) {
    if let Some(member) = find_member(store, &user.id) {
        return (member.clone(), false);
    }

    let name = display_name(user);
    let username = user
        .email
        .as_deref()
        .and_then(|e| e.split('@').next())
        .filter(|local| !local.is_empty())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| name.to_ascii_lowercase().replace(' ', "."));

    let member = Member {
        id: new_id("m"),
        name,
        username,
        avatar_src: None,
        status: "Member".to_string(),
        joined: Some(date_only(now)),
        team_ids: Vec::new(),
        provisioned: true,
        uid: Some(user.id.clone()),
    };
    store.members.push(member.clone());
    tracing::info!(member_id = %member.id, "Provisioned member for new principal");
    (member, true)
}

pub fn me_view(store: &Store, user_id: &str) -> Result<MeView, ServiceError> {
    let member = find_member(store, user_id)
        .ok_or_else(|| ServiceError::NotFound("Member not found".to_string()))?;
    let teams = store
        .teams
        .iter()
        .filter(|t| t.member_ids.contains(&member.id) || member.team_ids.contains(&t.id))
        .cloned()
        .collect();
    Ok(MeView {
        member: member.clone(),
        teams,
        workspaces: workspaces_for_member(store, &member.id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::fixtures::{at, store};

    fn principal(id: &str, email: Option<&str>) -> AuthUser {
        AuthUser {
            id: id.into(),
            email: email.map(str::to_string),
            name: None,
        }
    }

    #[test]
    fn members_resolve_by_uid_then_id() {
        let store = store();
        assert_eq!(find_member(&store, "auth-ana").map(|m| m.id.as_str()), Some("m-ana"));
        assert_eq!(find_member(&store, "m-bo").map(|m| m.id.as_str()), Some("m-bo"));
        assert_eq!(member_id_for(&store, "auth-ana"), "m-ana");
        assert_eq!(member_id_for(&store, "stranger"), "stranger");
    }

    #[test]
    fn author_falls_back_to_raw_id() {
        let store = store();
        assert_eq!(author_for(&store, "auth-ana").name, "Ana");
        let anon = author_for(&store, DEFAULT_USER_ID);
        assert_eq!(anon.id, DEFAULT_USER_ID);
        assert_eq!(anon.name, "You");
    }

    #[test]
    fn ensure_member_provisions_once() {
        let mut store = store();
        let user = principal("auth-cy", Some("Cy.Lee@example.com"));
        let (member, created) = ensure_member(&mut store, &user, at(0));
        assert!(created);
        assert!(member.provisioned);
        assert!(member.id.starts_with("m-"));
        assert_eq!(member.uid.as_deref(), Some("auth-cy"));
        assert_eq!(member.name, "Cy.Lee");
        assert_eq!(member.username, "cy.lee");
        assert_eq!(member.joined.as_deref(), Some("2026-01-01"));

        let (again, created) = ensure_member(&mut store, &user, at(60));
        assert!(!created);
        assert_eq!(again.id, member.id);
        assert_eq!(store.members.len(), 3);
    }

    #[test]
    fn ensure_member_keeps_existing_binding() {
        let mut store = store();
        let (member, created) = ensure_member(&mut store, &principal("auth-ana", None), at(0));
        assert!(!created);
        assert_eq!(member.id, "m-ana");
    }

    #[test]
    fn me_view_lists_teams_and_workspaces() {
        let store = store();
        let view = me_view(&store, "m-bo").expect("view");
        let teams: Vec<&str> = view.teams.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(teams, vec!["team-product", "team-design"]);
        assert_eq!(view.workspaces.len(), 1);

        let err = me_view(&store, DEFAULT_USER_ID).expect_err("unbound caller");
        assert_eq!(err.status_code().as_u16(), 404);
    }
}

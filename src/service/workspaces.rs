use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::{ServiceError, WORKSPACE_SLUG_TAKEN};
use crate::model::{Store, Workspace};
use crate::service::{new_id, optional_text, required};

pub const DEFAULT_REGION: &str = "us-east-1";

/// Longest slug accepted in a workspace URL.
pub const MAX_SLUG_LEN: usize = 48;

static SLUG_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$"));

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkspaceInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub region: Option<String>,
}

/// Trim, lowercase and validate a workspace URL slug.
pub fn normalize_slug(raw: &str) -> Result<String, ServiceError> {
    let slug = raw.trim().to_ascii_lowercase();
    if slug.is_empty() {
        return Err(ServiceError::Validation("slug is required".to_string()));
    }
    let pattern = SLUG_RE
        .as_ref()
        .map_err(|e| ServiceError::Failed(format!("slug pattern: {e}")))?;
    if slug.len() > MAX_SLUG_LEN || !pattern.is_match(&slug) {
        return Err(ServiceError::Validation(
            format!(
                "slug may only contain lowercase letters, digits and single inner hyphens, \
                 up to {MAX_SLUG_LEN} characters"
            ),
        ));
    }
    Ok(slug)
}

pub fn workspaces_for_member(store: &Store, member_id: &str) -> Vec<Workspace> {
    store
        .workspaces
        .iter()
        .filter(|ws| ws.member_ids.iter().any(|id| id == member_id))
        .cloned()
        .collect()
}

/// Create a workspace whose first member is `creator_id`.
pub fn create_workspace(
    store: &mut Store,
    input: CreateWorkspaceInput,
    creator_id: &str,
) -> Result<Workspace, ServiceError> {
    let name = required("name", input.name.as_deref())?;
    let slug = normalize_slug(input.slug.as_deref().unwrap_or_default())?;

    if store
        .workspaces
        .iter()
        .any(|ws| ws.slug.eq_ignore_ascii_case(&slug))
    {
        return Err(ServiceError::Conflict {
            code: WORKSPACE_SLUG_TAKEN,
            message: "Workspace URL is already reserved".to_string(),
        });
    }

    let workspace = Workspace {
        id: new_id("ws"),
        name,
        slug,
        region: optional_text(input.region).unwrap_or_else(|| DEFAULT_REGION.to_string()),
        member_ids: vec![creator_id.to_string()],
    };
    store.workspaces.push(workspace.clone());
    tracing::info!(workspace_id = %workspace.id, slug = %workspace.slug, "Workspace created");
    Ok(workspace)
}

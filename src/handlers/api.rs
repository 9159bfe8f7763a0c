//! Protected resource API.
//!
//! These handlers sit behind the bearer-auth middleware and demonstrate
//! the authorization pattern every protected RPC follows: take the
//! [`Principal`] from extensions, consult the authorizer, then act.

use axum::{extract::Path, Extension, Json};
use serde::Serialize;

use crate::error::RpcError;
use crate::utils::authz::{self, Principal, ProjectScope};

#[derive(Serialize)]
pub struct ProjectEntry {
    pub id: String,
    pub role: String,
}

#[derive(Serialize)]
pub struct ProjectsResponse {
    /// Superadmins see every project; the list is then empty by design.
    pub all: bool,
    pub projects: Vec<ProjectEntry>,
}

/// GET /api/projects — the projects visible to the caller.
pub async fn list_projects_handler(
    Extension(principal): Extension<Principal>,
) -> Result<Json<ProjectsResponse>, RpcError> {
    authz::check_permission(&principal, "project:read")?;

    let response = match authz::user_projects(&principal) {
        ProjectScope::All => ProjectsResponse {
            all: true,
            projects: Vec::new(),
        },
        ProjectScope::Projects(ids) => ProjectsResponse {
            all: false,
            projects: ids
                .into_iter()
                .map(|id| {
                    let role = principal
                        .memberships
                        .get(&id)
                        .cloned()
                        .unwrap_or_default();
                    ProjectEntry { id, role }
                })
                .collect(),
        },
    };

    Ok(Json(response))
}

/// GET /api/projects/{project_id} — membership-guarded project view.
pub async fn get_project_handler(
    Extension(principal): Extension<Principal>,
    Path(project_id): Path<String>,
) -> Result<Json<ProjectEntry>, RpcError> {
    authz::check_project_access(&principal, "project:read", &project_id)?;

    // Superadmins may not hold a membership row for the project.
    let role = principal
        .memberships
        .get(&project_id)
        .cloned()
        .unwrap_or_else(|| "superadmin".to_string());

    Ok(Json(ProjectEntry {
        id: project_id,
        role,
    }))
}

#[derive(Serialize)]
pub struct PrincipalResponse {
    pub user_id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub perms: Vec<String>,
    pub memberships: std::collections::BTreeMap<String, String>,
}

/// GET /api/profile — echo of the authenticated principal.
pub async fn principal_handler(
    Extension(principal): Extension<Principal>,
) -> Result<Json<PrincipalResponse>, RpcError> {
    Ok(Json(PrincipalResponse {
        user_id: principal.user_id.clone(),
        email: principal.email.clone(),
        email_verified: principal.email_verified,
        perms: principal.perms.clone(),
        memberships: principal.memberships.clone(),
    }))
}

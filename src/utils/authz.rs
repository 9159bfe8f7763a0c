//! Permission and project-membership checks for protected handlers.
//!
//! Every protected RPC consults these helpers through the [`Principal`]
//! injected by the bearer-auth middleware. A handler reached without a
//! principal denies by default.

use std::collections::BTreeMap;

use crate::error::RpcError;
use crate::utils::jwt::AccessTokenClaims;

/// The permission that marks a superadmin. Holders bypass membership checks.
pub const ROOT_PERMISSION: &str = "root";

/// Authenticated identity view built from a validated access token.
/// Immutable for the lifetime of the request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
    pub email: Option<String>,
    pub perms: Vec<String>,
    pub memberships: BTreeMap<String, String>,
    pub email_verified: bool,
}

impl From<AccessTokenClaims> for Principal {
    fn from(claims: AccessTokenClaims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            perms: claims.perms,
            memberships: claims.memberships,
            email_verified: claims.email_verified,
        }
    }
}

/// The set of projects a principal can act on.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectScope {
    /// Superadmins see every project.
    All,
    /// Regular users see the projects they are members of.
    Projects(Vec<String>),
}

/// Check if a principal holds the `root` permission.
pub fn is_super_admin(principal: &Principal) -> bool {
    principal.perms.iter().any(|p| p == ROOT_PERMISSION)
}

/// Check a global permission.
///
/// Passes if the principal is a superadmin or holds the permission,
/// otherwise fails `PERMISSION_DENIED`.
pub fn check_permission(principal: &Principal, permission: &str) -> Result<(), RpcError> {
    if is_super_admin(principal) || principal.perms.iter().any(|p| p == permission) {
        return Ok(());
    }
    Err(RpcError::PermissionDenied(format!(
        "missing permission: {}",
        permission
    )))
}

/// Check a permission combined with membership in a project.
///
/// Superadmins bypass the membership requirement; everyone else needs
/// both the global permission and a membership row for the project.
pub fn check_project_access(
    principal: &Principal,
    permission: &str,
    project_id: &str,
) -> Result<(), RpcError> {
    if is_super_admin(principal) {
        return Ok(());
    }
    check_permission(principal, permission)?;
    if principal.memberships.contains_key(project_id) {
        Ok(())
    } else {
        Err(RpcError::PermissionDenied(format!(
            "not a member of project {}",
            project_id
        )))
    }
}

/// The projects visible to a principal.
pub fn user_projects(principal: &Principal) -> ProjectScope {
    if is_super_admin(principal) {
        ProjectScope::All
    } else {
        ProjectScope::Projects(principal.memberships.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(perms: &[&str], projects: &[&str]) -> Principal {
        Principal {
            user_id: "usr00000000001".to_string(),
            email: Some("a@b.test".to_string()),
            perms: perms.iter().map(|s| s.to_string()).collect(),
            memberships: projects
                .iter()
                .map(|p| (p.to_string(), "member".to_string()))
                .collect(),
            email_verified: true,
        }
    }

    #[test]
    fn root_permission_makes_super_admin() {
        assert!(is_super_admin(&principal(&["root"], &[])));
        assert!(!is_super_admin(&principal(&["employee:read"], &[])));
        // "root" must be held literally, not as a prefix.
        assert!(!is_super_admin(&principal(&["rooted"], &[])));
    }

    #[test]
    fn check_permission_requires_exact_permission() {
        let p = principal(&["employee:read"], &[]);
        assert!(check_permission(&p, "employee:read").is_ok());
        assert!(matches!(
            check_permission(&p, "employee:write"),
            Err(RpcError::PermissionDenied(_))
        ));
    }

    #[test]
    fn super_admin_passes_any_permission() {
        let p = principal(&["root"], &[]);
        assert!(check_permission(&p, "anything:at_all").is_ok());
    }

    #[test]
    fn project_access_needs_permission_and_membership() {
        let p = principal(&["employee:read"], &["proj0000000001"]);

        assert!(check_project_access(&p, "employee:read", "proj0000000001").is_ok());
        // Member but missing the permission.
        assert!(check_project_access(&p, "employee:write", "proj0000000001").is_err());
        // Permission but not a member.
        assert!(check_project_access(&p, "employee:read", "proj0000000002").is_err());
    }

    #[test]
    fn super_admin_bypasses_membership() {
        let p = principal(&["root"], &[]);
        assert!(check_project_access(&p, "employee:read", "proj0000000009").is_ok());
    }

    #[test]
    fn user_projects_scope() {
        let p = principal(&["employee:read"], &["proj0000000001", "proj0000000002"]);
        match user_projects(&p) {
            ProjectScope::Projects(mut ids) => {
                ids.sort();
                assert_eq!(ids, vec!["proj0000000001", "proj0000000002"]);
            }
            other => panic!("unexpected scope: {:?}", other),
        }

        assert_eq!(user_projects(&principal(&["root"], &[])), ProjectScope::All);
    }

    #[test]
    fn empty_principal_is_denied() {
        let p = principal(&[], &[]);
        assert!(check_permission(&p, "employee:read").is_err());
        assert!(check_project_access(&p, "employee:read", "proj0000000001").is_err());
    }
}

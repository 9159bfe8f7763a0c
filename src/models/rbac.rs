use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Valid names for roles and permissions. Permissions follow the
/// `entity:action` convention by practice; the regex is the hard rule.
static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_:]+$").unwrap());

/// A global role, assignable to users directly.
#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A global permission, reachable through roles or direct assignment.
#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Validate a role or permission name.
#[allow(dead_code)]
pub fn is_valid_rbac_name(name: &str) -> bool {
    !name.is_empty() && NAME_PATTERN.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_pattern() {
        assert!(is_valid_rbac_name("root"));
        assert!(is_valid_rbac_name("employee:read"));
        assert!(is_valid_rbac_name("User_2"));
        assert!(!is_valid_rbac_name(""));
        assert!(!is_valid_rbac_name("employee.read"));
        assert!(!is_valid_rbac_name("employee read"));
        assert!(!is_valid_rbac_name("employee-read"));
    }
}

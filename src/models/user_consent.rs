use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Durable per-user-per-client scope grant. Unique on `(user_id,
/// client_id)`; `revoked_at` is the soft-delete marker.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserConsent {
    pub id: i64,
    pub user_id: i64,
    pub client_id: i64,
    pub scope: String,
    pub granted_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl UserConsent {
    /// Whether this grant subsumes a requested scope string: the consent
    /// must be unrevoked and the requested scopes a subset of the granted
    /// set. Both strings are tokenized by whitespace.
    pub fn covers(&self, requested: &str) -> bool {
        if self.revoked_at.is_some() {
            return false;
        }
        let granted: HashSet<&str> = self.scope.split_whitespace().collect();
        requested.split_whitespace().all(|s| granted.contains(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consent(scope: &str, revoked: bool) -> UserConsent {
        UserConsent {
            id: 1,
            user_id: 1,
            client_id: 1,
            scope: scope.to_string(),
            granted_at: Utc::now(),
            revoked_at: revoked.then(Utc::now),
        }
    }

    #[test]
    fn subset_law() {
        let c = consent("openid email profile", false);
        assert!(c.covers("openid email"));
        assert!(c.covers("openid email profile"));
        assert!(c.covers(""));
        assert!(!c.covers("openid email offline_access"));
    }

    #[test]
    fn revoked_consent_covers_nothing() {
        let c = consent("openid email", true);
        assert!(!c.covers("openid"));
    }

    #[test]
    fn whitespace_tokenization_is_robust() {
        let c = consent("openid  email", false);
        assert!(c.covers("  email   openid "));
    }
}

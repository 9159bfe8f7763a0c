use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A registered OAuth client. Created and mutated by admin tooling; the
/// authorization server reads it only.
///
/// Invariants maintained by the admin surface:
/// - public clients (`confidential = false`) always have `pkce_required = true`
/// - confidential clients always carry a `client_secret_hash`
/// - the default client cannot be deleted and requires PKCE
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    pub id: i64,
    pub public_id: String,
    pub name: String,
    /// UUID, globally unique, used as the wire-facing client identifier
    /// and as the token audience.
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret_hash: Option<String>,
    /// Registered redirect URIs; matching is exact, no wildcards.
    pub redirect_uris: Vec<String>,
    pub pkce_required: bool,
    pub confidential: bool,
    pub is_default: bool,
    /// Scope names the client may request.
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Row type for MySQL query results; JSON columns decode separately.
#[derive(Debug, Clone, FromRow)]
pub struct OAuthClientRow {
    pub id: i64,
    pub public_id: String,
    pub name: String,
    pub client_id: String,
    pub client_secret_hash: Option<String>,
    pub redirect_uris: serde_json::Value,
    pub pkce_required: bool,
    pub confidential: bool,
    pub is_default: bool,
    pub scopes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<OAuthClientRow> for OAuthClient {
    fn from(row: OAuthClientRow) -> Self {
        let redirect_uris: Vec<String> =
            serde_json::from_value(row.redirect_uris).unwrap_or_default();
        let scopes = row
            .scopes
            .map(|s| s.split(',').map(|p| p.to_string()).collect())
            .unwrap_or_default();

        Self {
            id: row.id,
            public_id: row.public_id,
            name: row.name,
            client_id: row.client_id,
            client_secret_hash: row.client_secret_hash,
            redirect_uris,
            pkce_required: row.pkce_required,
            confidential: row.confidential,
            is_default: row.is_default,
            scopes,
            created_at: row.created_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for OAuthClient {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        let client_row = OAuthClientRow::from_row(row)?;
        Ok(OAuthClient::from(client_row))
    }
}

impl OAuthClient {
    /// Check if this is a public client.
    pub fn is_public(&self) -> bool {
        !self.confidential
    }

    /// Exact-match lookup of a redirect URI against the registered list.
    pub fn has_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == uri)
    }

    /// Check whether every requested scope is assigned to this client.
    pub fn allows_scopes<'a>(&self, requested: impl Iterator<Item = &'a str>) -> bool {
        let mut requested = requested.peekable();
        if requested.peek().is_none() {
            return true;
        }
        requested.into_iter().all(|s| self.scopes.iter().any(|a| a == s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OAuthClient {
        OAuthClient {
            id: 1,
            public_id: "cli00000000001".to_string(),
            name: "Dashboard".to_string(),
            client_id: "5d0a9b63-3f43-4b53-9a2a-111111111111".to_string(),
            client_secret_hash: None,
            redirect_uris: vec!["https://app.example.com/cb".to_string()],
            pkce_required: true,
            confidential: false,
            is_default: false,
            scopes: vec!["openid".to_string(), "email".to_string()],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn redirect_uri_match_is_exact() {
        let c = client();
        assert!(c.has_redirect_uri("https://app.example.com/cb"));
        assert!(!c.has_redirect_uri("https://app.example.com/cb/"));
        assert!(!c.has_redirect_uri("https://app.example.com/cb?x=1"));
        assert!(!c.has_redirect_uri("https://app.example.com"));
    }

    #[test]
    fn scope_assignment_check() {
        let c = client();
        assert!(c.allows_scopes(["openid"].into_iter()));
        assert!(c.allows_scopes(["openid", "email"].into_iter()));
        assert!(!c.allows_scopes(["openid", "profile"].into_iter()));
        assert!(c.allows_scopes(std::iter::empty()));
    }
}

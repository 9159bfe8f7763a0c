use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single-use authorization code binding user, client, redirect URI and
/// scope. `exchanged_at` is the soft-delete marker: once set, the code is
/// terminally spent and any further exchange attempt must fail.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuthorizationCode {
    pub id: i64,
    /// UUID v4, the wire value of the `code` parameter.
    pub code: String,
    pub client_id: i64,
    pub user_id: i64,
    pub redirect_uri: String,
    pub scope: String,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub exchanged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AuthorizationCode {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    pub fn is_exchanged(&self) -> bool {
        self.exchanged_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn code(expires_in: i64, exchanged: bool) -> AuthorizationCode {
        AuthorizationCode {
            id: 1,
            code: "a9bfa24f-93d4-4ce8-a7f0-222222222222".to_string(),
            client_id: 1,
            user_id: 1,
            redirect_uri: "https://app.example.com/cb".to_string(),
            scope: "openid email".to_string(),
            nonce: None,
            code_challenge: None,
            code_challenge_method: None,
            expires_at: Utc::now() + Duration::seconds(expires_in),
            exchanged_at: exchanged.then(Utc::now),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn expiry_boundary() {
        assert!(!code(60, false).is_expired());
        assert!(code(-1, false).is_expired());
    }

    #[test]
    fn exchanged_is_terminal() {
        assert!(!code(60, false).is_exchanged());
        assert!(code(60, true).is_exchanged());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Server-side session state bound to the opaque cookie id. Tokens are
/// never stored here; the session only carries login progress.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuthSession {
    /// Cryptographically random opaque id, also the cookie value.
    pub id: String,
    pub user_id: Option<i64>,
    pub authenticated_at: Option<DateTime<Utc>>,
    /// Where to send the user after login completes.
    pub original_url: Option<String>,
    /// Round-trip state for the in-flight upstream login.
    pub oauth_state: Option<String>,
    pub oauth_provider: Option<String>,
    /// Single-use token protecting the consent form.
    pub csrf_token: Option<String>,
    /// Email captured between OTP issuance and verification.
    pub pending_otp_email: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl AuthSession {
    /// A session is authenticated once a user id is bound to it.
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    #[allow(dead_code)]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

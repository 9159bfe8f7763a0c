use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single-use refresh token. Each successful refresh marks the row
/// exchanged and issues a new token (rotation); chains are linear and
/// reconstructable from `created_at` per `(client_id, user_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefreshToken {
    pub id: i64,
    /// UUID v4, the opaque wire value.
    pub token: String,
    pub client_id: i64,
    pub user_id: i64,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
    pub exchanged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    pub fn is_exchanged(&self) -> bool {
        self.exchanged_at.is_some()
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A one-time email login code. Only the SHA-256 hex of the code is
/// stored; `used_at` marks consumption.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OtpToken {
    pub id: i64,
    pub email: String,
    pub otp_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

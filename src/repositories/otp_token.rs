use chrono::{Duration, Utc};
use sqlx::MySqlPool;

use crate::models::OtpToken;

/// Repository for one-time email login codes.
#[derive(Clone)]
pub struct OtpTokenRepository {
    pool: MySqlPool,
}

impl OtpTokenRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        email: &str,
        otp_hash: &str,
        expires_in_seconds: i64,
    ) -> anyhow::Result<OtpToken> {
        let expires_at = Utc::now() + Duration::seconds(expires_in_seconds);

        let result = sqlx::query(
            r#"
            INSERT INTO otp_tokens (email, otp_hash, expires_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(email)
        .bind(otp_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_id() as i64;
        let row = sqlx::query_as::<_, OtpToken>(
            r#"
            SELECT id, email, otp_hash, expires_at, used_at, created_at
            FROM otp_tokens
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Count issuances for an email inside the rolling rate-limit window.
    pub async fn count_recent(&self, email: &str, window_seconds: i64) -> anyhow::Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM otp_tokens
            WHERE email = ? AND created_at > DATE_SUB(NOW(), INTERVAL ? SECOND)
            "#,
        )
        .bind(email)
        .bind(window_seconds)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// The latest unused, unexpired row matching `(email, hash)`.
    pub async fn find_valid(
        &self,
        email: &str,
        otp_hash: &str,
    ) -> anyhow::Result<Option<OtpToken>> {
        let row = sqlx::query_as::<_, OtpToken>(
            r#"
            SELECT id, email, otp_hash, expires_at, used_at, created_at
            FROM otp_tokens
            WHERE email = ? AND otp_hash = ? AND used_at IS NULL AND expires_at > NOW()
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(email)
        .bind(otp_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Consume an OTP. The guard makes concurrent verifications linearize:
    /// the loser observes `false` and the verification fails.
    pub async fn mark_used(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE otp_tokens
            SET used_at = NOW()
            WHERE id = ? AND used_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete expired rows (cleanup).
    pub async fn delete_expired(&self) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM otp_tokens
            WHERE expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

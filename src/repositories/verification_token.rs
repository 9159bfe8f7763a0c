use chrono::{Duration, Utc};
use sqlx::MySqlPool;

use crate::models::EmailVerificationToken;

/// Repository for email-verification tokens.
#[derive(Clone)]
pub struct VerificationTokenRepository {
    pool: MySqlPool,
}

impl VerificationTokenRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_in_hours: i64,
    ) -> anyhow::Result<EmailVerificationToken> {
        let expires_at = Utc::now() + Duration::hours(expires_in_hours);

        let result = sqlx::query(
            r#"
            INSERT INTO email_verification_tokens (user_id, token_hash, expires_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_id() as i64;
        let row = sqlx::query_as::<_, EmailVerificationToken>(
            r#"
            SELECT id, user_id, token_hash, expires_at, used_at, created_at
            FROM email_verification_tokens
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Invalidate every unused token for a user. Issuing a new token calls
    /// this first so at most one token is live per user. Idempotent.
    pub async fn invalidate_user_tokens(&self, user_id: i64) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE email_verification_tokens
            SET used_at = NOW()
            WHERE user_id = ? AND used_at IS NULL
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// The unused, unexpired row for a token hash.
    pub async fn find_valid(&self, token_hash: &str) -> anyhow::Result<Option<EmailVerificationToken>> {
        let row = sqlx::query_as::<_, EmailVerificationToken>(
            r#"
            SELECT id, user_id, token_hash, expires_at, used_at, created_at
            FROM email_verification_tokens
            WHERE token_hash = ? AND used_at IS NULL AND expires_at > NOW()
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Consume a token; the guard ensures a token verifies at most once.
    pub async fn mark_used(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE email_verification_tokens
            SET used_at = NOW()
            WHERE id = ? AND used_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

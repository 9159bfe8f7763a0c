use chrono::{Duration, Utc};
use sqlx::MySqlPool;

use crate::models::RefreshToken;

/// Repository for refresh tokens.
#[derive(Clone)]
pub struct RefreshTokenRepository {
    pool: MySqlPool,
}

impl RefreshTokenRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        token: &str,
        client_id: i64,
        user_id: i64,
        scope: &str,
        expires_in_seconds: i64,
    ) -> anyhow::Result<RefreshToken> {
        let expires_at = Utc::now() + Duration::seconds(expires_in_seconds);

        let result = sqlx::query(
            r#"
            INSERT INTO oauth_refresh_tokens (token, client_id, user_id, scope, expires_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(token)
        .bind(client_id)
        .bind(user_id)
        .bind(scope)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_id() as i64;
        let row = sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT id, token, client_id, user_id, scope, expires_at, exchanged_at, created_at
            FROM oauth_refresh_tokens
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Find a token row by its wire value, regardless of state.
    pub async fn find_by_token(&self, token: &str) -> anyhow::Result<Option<RefreshToken>> {
        let row = sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT id, token, client_id, user_id, scope, expires_at, exchanged_at, created_at
            FROM oauth_refresh_tokens
            WHERE token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Mark a token exchanged (rotation or revocation). The guard makes
    /// concurrent exchanges linearize to a single winner.
    pub async fn mark_exchanged(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE oauth_refresh_tokens
            SET exchanged_at = NOW()
            WHERE id = ? AND exchanged_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete expired tokens (cleanup).
    pub async fn delete_expired(&self) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM oauth_refresh_tokens
            WHERE expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

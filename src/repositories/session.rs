use chrono::{Duration, Utc};
use sqlx::MySqlPool;

use crate::models::AuthSession;

/// Repository for server-side sessions.
#[derive(Clone)]
pub struct SessionRepository {
    pool: MySqlPool,
}

impl SessionRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Create an empty session with the given opaque id.
    pub async fn create(&self, id: &str, ttl_seconds: i64) -> anyhow::Result<AuthSession> {
        let expires_at = Utc::now() + Duration::seconds(ttl_seconds);

        sqlx::query(
            r#"
            INSERT INTO auth_sessions (id, expires_at)
            VALUES (?, ?)
            "#,
        )
        .bind(id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        self.find_valid(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("failed to fetch created session"))
    }

    /// Find an unexpired session by its cookie id.
    pub async fn find_valid(&self, id: &str) -> anyhow::Result<Option<AuthSession>> {
        let session = sqlx::query_as::<_, AuthSession>(
            r#"
            SELECT id, user_id, authenticated_at, original_url, oauth_state, oauth_provider,
                   csrf_token, pending_otp_email, expires_at, created_at
            FROM auth_sessions
            WHERE id = ? AND expires_at > NOW()
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Persist the mutable session fields.
    pub async fn update(&self, session: &AuthSession) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE auth_sessions
            SET user_id = ?, authenticated_at = ?, original_url = ?, oauth_state = ?,
                oauth_provider = ?, csrf_token = ?, pending_otp_email = ?
            WHERE id = ?
            "#,
        )
        .bind(session.user_id)
        .bind(session.authenticated_at)
        .bind(&session.original_url)
        .bind(&session.oauth_state)
        .bind(&session.oauth_provider)
        .bind(&session.csrf_token)
        .bind(&session.pending_otp_email)
        .bind(&session.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a session (logout).
    pub async fn delete(&self, id: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            DELETE FROM auth_sessions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete expired sessions (cleanup).
    pub async fn delete_expired(&self) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM auth_sessions
            WHERE expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

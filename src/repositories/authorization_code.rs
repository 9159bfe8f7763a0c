use chrono::{Duration, Utc};
use sqlx::MySqlPool;

use crate::models::AuthorizationCode;

/// Repository for authorization codes.
#[derive(Clone)]
pub struct AuthorizationCodeRepository {
    pool: MySqlPool,
}

impl AuthorizationCodeRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Store a freshly issued code.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        code: &str,
        client_id: i64,
        user_id: i64,
        redirect_uri: &str,
        scope: &str,
        nonce: Option<&str>,
        code_challenge: Option<&str>,
        code_challenge_method: Option<&str>,
        expires_in_seconds: i64,
    ) -> anyhow::Result<AuthorizationCode> {
        let expires_at = Utc::now() + Duration::seconds(expires_in_seconds);

        let result = sqlx::query(
            r#"
            INSERT INTO oauth_authorization_codes
            (code, client_id, user_id, redirect_uri, scope, nonce, code_challenge, code_challenge_method, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(code)
        .bind(client_id)
        .bind(user_id)
        .bind(redirect_uri)
        .bind(scope)
        .bind(nonce)
        .bind(code_challenge)
        .bind(code_challenge_method)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        self.find_by_id(result.last_insert_id() as i64)
            .await?
            .ok_or_else(|| anyhow::anyhow!("failed to fetch created authorization code"))
    }

    pub async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<AuthorizationCode>> {
        let code = sqlx::query_as::<_, AuthorizationCode>(
            r#"
            SELECT id, code, client_id, user_id, redirect_uri, scope, nonce,
                   code_challenge, code_challenge_method, expires_at, exchanged_at, created_at
            FROM oauth_authorization_codes
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(code)
    }

    /// Find a code row by its wire value, regardless of state. Callers
    /// decide how expired or exchanged rows map to protocol errors.
    pub async fn find_by_code(&self, code: &str) -> anyhow::Result<Option<AuthorizationCode>> {
        let row = sqlx::query_as::<_, AuthorizationCode>(
            r#"
            SELECT id, code, client_id, user_id, redirect_uri, scope, nonce,
                   code_challenge, code_challenge_method, expires_at, exchanged_at, created_at
            FROM oauth_authorization_codes
            WHERE code = ?
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Mark a code exchanged. The `exchanged_at IS NULL` guard linearizes
    /// concurrent exchanges: exactly one caller observes `true`.
    pub async fn mark_exchanged(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE oauth_authorization_codes
            SET exchanged_at = NOW()
            WHERE id = ? AND exchanged_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete expired codes (cleanup).
    pub async fn delete_expired(&self) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM oauth_authorization_codes
            WHERE expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

use sqlx::MySqlPool;

use crate::models::UserConsent;

/// Repository for per-user-per-client consent grants.
#[derive(Clone)]
pub struct UserConsentRepository {
    pool: MySqlPool,
}

impl UserConsentRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_user_and_client(
        &self,
        user_id: i64,
        client_id: i64,
    ) -> anyhow::Result<Option<UserConsent>> {
        let consent = sqlx::query_as::<_, UserConsent>(
            r#"
            SELECT id, user_id, client_id, scope, granted_at, revoked_at
            FROM oauth_user_consents
            WHERE user_id = ? AND client_id = ?
            "#,
        )
        .bind(user_id)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(consent)
    }

    /// Store or refresh a grant. Re-granting clears a prior revocation and
    /// replaces the scope set.
    pub async fn upsert(
        &self,
        user_id: i64,
        client_id: i64,
        scope: &str,
    ) -> anyhow::Result<UserConsent> {
        sqlx::query(
            r#"
            INSERT INTO oauth_user_consents (user_id, client_id, scope, granted_at)
            VALUES (?, ?, ?, NOW())
            ON DUPLICATE KEY UPDATE scope = VALUES(scope), granted_at = NOW(), revoked_at = NULL
            "#,
        )
        .bind(user_id)
        .bind(client_id)
        .bind(scope)
        .execute(&self.pool)
        .await?;

        self.find_by_user_and_client(user_id, client_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("failed to fetch stored consent"))
    }

    /// Revoke a grant (soft delete).
    pub async fn revoke(&self, user_id: i64, client_id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE oauth_user_consents
            SET revoked_at = NOW()
            WHERE user_id = ? AND client_id = ? AND revoked_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(client_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn list_by_user(&self, user_id: i64) -> anyhow::Result<Vec<UserConsent>> {
        let consents = sqlx::query_as::<_, UserConsent>(
            r#"
            SELECT id, user_id, client_id, scope, granted_at, revoked_at
            FROM oauth_user_consents
            WHERE user_id = ? AND revoked_at IS NULL
            ORDER BY granted_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(consents)
    }
}

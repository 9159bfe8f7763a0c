use sqlx::MySqlPool;

use crate::models::UserIdentity;

/// Repository for federated identity rows.
#[derive(Clone)]
pub struct UserIdentityRepository {
    pool: MySqlPool,
}

impl UserIdentityRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Look up an identity by its unique `(provider, provider_user_id)` pair.
    pub async fn find_by_provider(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> anyhow::Result<Option<UserIdentity>> {
        let identity = sqlx::query_as::<_, UserIdentity>(
            r#"
            SELECT id, user_id, provider, provider_user_id, metadata, last_login_at, created_at
            FROM user_identities
            WHERE provider = ? AND provider_user_id = ?
            "#,
        )
        .bind(provider)
        .bind(provider_user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(identity)
    }

    pub async fn create(
        &self,
        user_id: i64,
        provider: &str,
        provider_user_id: &str,
        metadata: Option<&serde_json::Value>,
    ) -> anyhow::Result<UserIdentity> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_identities (user_id, provider, provider_user_id, metadata, last_login_at)
            VALUES (?, ?, ?, ?, NOW())
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .bind(provider_user_id)
        .bind(metadata)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_id() as i64;
        let identity = sqlx::query_as::<_, UserIdentity>(
            r#"
            SELECT id, user_id, provider, provider_user_id, metadata, last_login_at, created_at
            FROM user_identities
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(identity)
    }

    /// Refresh the login timestamp and the provider profile snapshot.
    pub async fn touch_login(
        &self,
        id: i64,
        metadata: Option<&serde_json::Value>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE user_identities
            SET last_login_at = NOW(), metadata = COALESCE(?, metadata)
            WHERE id = ?
            "#,
        )
        .bind(metadata)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

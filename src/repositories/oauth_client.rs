use sqlx::MySqlPool;

use crate::models::OAuthClient;

const CLIENT_COLUMNS: &str = r#"
    c.id, c.public_id, c.name, c.client_id, c.client_secret_hash, c.redirect_uris,
    c.pkce_required, c.confidential, c.is_default,
    GROUP_CONCAT(s.name) AS scopes, c.created_at
"#;

/// Read-only repository for OAuth clients. Clients are managed by admin
/// tooling; the authorization server only resolves them.
#[derive(Clone)]
pub struct OAuthClientRepository {
    pool: MySqlPool,
}

impl OAuthClientRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Resolve a client by its wire `client_id` (UUID), including the
    /// assigned scope set.
    pub async fn find_by_client_id(&self, client_id: &str) -> anyhow::Result<Option<OAuthClient>> {
        let client = sqlx::query_as::<_, OAuthClient>(&format!(
            r#"
            SELECT {CLIENT_COLUMNS}
            FROM oauth_clients c
            LEFT JOIN oauth_client_scopes cs ON cs.client_id = c.id
            LEFT JOIN oauth_scopes s ON s.id = cs.scope_id
            WHERE c.client_id = ?
            GROUP BY c.id
            "#
        ))
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(client)
    }

    pub async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<OAuthClient>> {
        let client = sqlx::query_as::<_, OAuthClient>(&format!(
            r#"
            SELECT {CLIENT_COLUMNS}
            FROM oauth_clients c
            LEFT JOIN oauth_client_scopes cs ON cs.client_id = c.id
            LEFT JOIN oauth_scopes s ON s.id = cs.scope_id
            WHERE c.id = ?
            GROUP BY c.id
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(client)
    }
}

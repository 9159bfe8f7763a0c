use sqlx::MySqlPool;

use crate::models::User;

/// Repository for user rows. The core creates users only through the
/// registration pipeline; everything else is read or flag updates.
#[derive(Clone)]
pub struct UserRepository {
    pool: MySqlPool,
}

impl UserRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Create a user. `is_active` comes from the auto-activation policy.
    pub async fn create(
        &self,
        public_id: &str,
        email: &str,
        first_name: &str,
        last_name: &str,
        avatar_url: Option<&str>,
        is_active: bool,
    ) -> anyhow::Result<User> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (public_id, email, first_name, last_name, avatar_url, is_active, email_verified)
            VALUES (?, ?, ?, ?, ?, ?, FALSE)
            "#,
        )
        .bind(public_id)
        .bind(email)
        .bind(first_name)
        .bind(last_name)
        .bind(avatar_url)
        .bind(is_active)
        .execute(&self.pool)
        .await?;

        self.find_by_id(result.last_insert_id() as i64)
            .await?
            .ok_or_else(|| anyhow::anyhow!("failed to fetch created user"))
    }

    pub async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, public_id, email, first_name, last_name, avatar_url,
                   is_active, email_verified, activated_at, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_public_id(&self, public_id: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, public_id, email, first_name, last_name, avatar_url,
                   is_active, email_verified, activated_at, created_at
            FROM users
            WHERE public_id = ?
            "#,
        )
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Email lookup is case-insensitive; the column stores the address as
    /// entered but uniqueness is enforced on the lowercased form.
    pub async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, public_id, email, first_name, last_name, avatar_url,
                   is_active, email_verified, activated_at, created_at
            FROM users
            WHERE LOWER(email) = LOWER(?)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Mark the user's email verified. Also stamps `activated_at` if it
    /// was never set, so verification activates first-time accounts.
    /// Idempotent: a second call changes nothing.
    pub async fn mark_email_verified(&self, user_id: i64) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET email_verified = TRUE, activated_at = COALESCE(activated_at, NOW())
            WHERE id = ?
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

use sqlx::MySqlPool;

use crate::models::ProjectMember;

/// Repository for project membership rows.
#[derive(Clone)]
pub struct ProjectMemberRepository {
    pool: MySqlPool,
}

impl ProjectMemberRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// All memberships for a user; feeds the `memberships` token claim.
    pub async fn list_for_user(&self, user_id: i64) -> anyhow::Result<Vec<ProjectMember>> {
        let members = sqlx::query_as::<_, ProjectMember>(
            r#"
            SELECT id, project_public_id, user_id, role, created_at
            FROM project_members
            WHERE user_id = ?
            ORDER BY project_public_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }

    /// Add a membership. `(project, user)` is unique; re-registering an
    /// existing member is a no-op rather than an error.
    pub async fn create(
        &self,
        project_public_id: &str,
        user_id: i64,
        role: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT IGNORE INTO project_members (project_public_id, user_id, role)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(project_public_id)
        .bind(user_id)
        .bind(role)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

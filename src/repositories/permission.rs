use sqlx::MySqlPool;

/// Repository over the global RBAC tables. Roles and permissions are
/// system-wide; the core only reads them and assigns the default role at
/// registration.
#[derive(Clone)]
pub struct PermissionRepository {
    pool: MySqlPool,
}

impl PermissionRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// The flattened permission set for a user: direct grants unioned with
    /// everything reachable through role assignments. Feeds the `perms`
    /// token claim.
    pub async fn list_permission_names_for_user(&self, user_id: i64) -> anyhow::Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT p.name
            FROM permissions p
            WHERE p.id IN (
                SELECT up.permission_id FROM users_permissions up WHERE up.user_id = ?
                UNION
                SELECT rp.permission_id
                FROM roles_permissions rp
                JOIN users_roles ur ON ur.role_id = rp.role_id
                WHERE ur.user_id = ?
            )
            ORDER BY p.name
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(names)
    }

    /// Assign a global role by name; missing roles are reported, duplicate
    /// assignments are ignored.
    pub async fn assign_role_by_name(&self, user_id: i64, role_name: &str) -> anyhow::Result<()> {
        let role_id = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT id FROM roles WHERE name = ?
            "#,
        )
        .bind(role_name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| anyhow::anyhow!("role not found: {}", role_name))?;

        sqlx::query(
            r#"
            INSERT IGNORE INTO users_roles (user_id, role_id)
            VALUES (?, ?)
            "#,
        )
        .bind(user_id)
        .bind(role_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::schema::Database;
use super::types::{to_millis, StoreError, User, UserRow};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Look up a user by username.
    pub async fn get_user_by_username(&self, name: &str) -> Result<User, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, name, created_at, updated_at FROM users WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::NotFound { entity: "user" })?
            .into_user()
    }

    /// Insert a user. A taken username yields [`StoreError::Duplicate`].
    pub async fn create_user(
        &self,
        id: Uuid,
        name: &str,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let row: UserRow = sqlx::query_as(
            r#"
            INSERT INTO users (id, name, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, name, created_at, updated_at
        "#,
        )
        .bind(id.to_string())
        .bind(name)
        .bind(to_millis(created_at))
        .bind(to_millis(updated_at))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::on_insert("user", e))?;

        row.into_user()
    }

    /// Delete every user. Feeds, follows and posts go with them (ON DELETE CASCADE).
    pub async fn delete_all_users(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM users")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// All users ordered by username
    pub async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT id, name, created_at, updated_at FROM users ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(UserRow::into_user).collect()
    }
}

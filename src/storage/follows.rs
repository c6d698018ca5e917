use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::schema::Database;
use super::types::{to_millis, FeedFollow, FeedFollowRow, FollowDetails, StoreError};

#[derive(Debug, sqlx::FromRow)]
struct FollowDetailsRow {
    #[sqlx(flatten)]
    follow: FeedFollowRow,
    feed_name: String,
    user_name: String,
}

impl Database {
    // ========================================================================
    // Follow Operations
    // ========================================================================

    /// Subscribe a user to a feed.
    ///
    /// At most one follow exists per (user, feed); a second attempt is
    /// reported as [`StoreError::Duplicate`] rather than ignored.
    pub async fn create_feed_follow(
        &self,
        id: Uuid,
        user_id: Uuid,
        feed_id: Uuid,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<FeedFollow, StoreError> {
        let row: FeedFollowRow = sqlx::query_as(
            r#"
            INSERT INTO feed_follows (id, user_id, feed_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, user_id, feed_id, created_at, updated_at
        "#,
        )
        .bind(id.to_string())
        .bind(user_id.to_string())
        .bind(feed_id.to_string())
        .bind(to_millis(created_at))
        .bind(to_millis(updated_at))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::on_insert("follow", e))?;

        row.into_follow()
    }

    /// Remove a follow. Returns `NotFound` if the user did not follow the feed.
    pub async fn delete_feed_follow(&self, user_id: Uuid, feed_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = ? AND feed_id = ?")
            .bind(user_id.to_string())
            .bind(feed_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: "follow" });
        }
        Ok(())
    }

    /// Follows of one user, with feed and user names, ordered by feed name
    pub async fn list_follows_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<FollowDetails>, StoreError> {
        let rows: Vec<FollowDetailsRow> = sqlx::query_as(
            r#"
            SELECT ff.id, ff.user_id, ff.feed_id, ff.created_at, ff.updated_at,
                   f.name AS feed_name, u.name AS user_name
            FROM feed_follows ff
            JOIN feeds f ON f.id = ff.feed_id
            JOIN users u ON u.id = ff.user_id
            WHERE ff.user_id = ?
            ORDER BY f.name
        "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(FollowDetails {
                    follow: r.follow.into_follow()?,
                    feed_name: r.feed_name,
                    user_name: r.user_name,
                })
            })
            .collect()
    }
}

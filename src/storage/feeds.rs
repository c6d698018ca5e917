use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::schema::Database;
use super::types::{to_millis, Feed, FeedRow, FeedWithOwner, StoreError};

const FEED_COLUMNS: &str = "id, name, url, user_id, created_at, updated_at, last_fetched_at";

/// Feed columns plus the owner's username
#[derive(Debug, sqlx::FromRow)]
struct FeedOwnerRow {
    #[sqlx(flatten)]
    feed: FeedRow,
    owner: String,
}

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a feed. The URL is unique across all feeds.
    pub async fn create_feed(
        &self,
        id: Uuid,
        name: &str,
        url: &str,
        user_id: Uuid,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Feed, StoreError> {
        let row: FeedRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO feeds (id, name, url, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(id.to_string())
        .bind(name)
        .bind(url)
        .bind(user_id.to_string())
        .bind(to_millis(created_at))
        .bind(to_millis(updated_at))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::on_insert("feed", e))?;

        row.into_feed()
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Feed, StoreError> {
        let row: Option<FeedRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"))
                .bind(url)
                .fetch_optional(&self.pool)
                .await?;

        row.ok_or(StoreError::NotFound { entity: "feed" })?
            .into_feed()
    }

    /// All feeds with the username of whoever added them, ordered by feed name
    pub async fn list_feeds_with_owner(&self) -> Result<Vec<FeedWithOwner>, StoreError> {
        let rows: Vec<FeedOwnerRow> = sqlx::query_as(
            r#"
            SELECT f.id, f.name, f.url, f.user_id, f.created_at, f.updated_at,
                   f.last_fetched_at, u.name AS owner
            FROM feeds f
            JOIN users u ON u.id = f.user_id
            ORDER BY f.name, f.url
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(FeedWithOwner {
                    feed: r.feed.into_feed()?,
                    owner: r.owner,
                })
            })
            .collect()
    }

    /// The feed that has waited longest for a refresh.
    ///
    /// Never-fetched feeds come first; ties fall back to creation order so
    /// the pick is deterministic.
    pub async fn get_next_feed_to_fetch(&self) -> Result<Feed, StoreError> {
        let row: Option<FeedRow> = sqlx::query_as(&format!(
            r#"
            SELECT {FEED_COLUMNS} FROM feeds
            ORDER BY last_fetched_at IS NOT NULL, last_fetched_at ASC, created_at ASC, id ASC
            LIMIT 1
        "#
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::NoFeeds)?.into_feed()
    }

    /// Stamp a feed as fetched at `fetched_at`
    pub async fn mark_feed_fetched(
        &self,
        feed_id: Uuid,
        fetched_at: DateTime<Utc>,
    ) -> Result<Feed, StoreError> {
        let ts = to_millis(fetched_at);
        let row: Option<FeedRow> = sqlx::query_as(&format!(
            r#"
            UPDATE feeds SET last_fetched_at = ?, updated_at = ?
            WHERE id = ?
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(ts)
        .bind(ts)
        .bind(feed_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::NotFound { entity: "feed" })?
            .into_feed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::User;
    use chrono::Duration;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    async fn test_user(db: &Database, name: &str) -> User {
        let now = Utc::now();
        db.create_user(Uuid::new_v4(), name, now, now).await.unwrap()
    }

    async fn test_feed(db: &Database, user: &User, n: u32) -> Feed {
        let now = Utc::now();
        db.create_feed(
            Uuid::new_v4(),
            &format!("Feed {}", n),
            &format!("https://feed{}.example.com/rss", n),
            user.id,
            now,
            now,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_feed_starts_unfetched() {
        let db = test_db().await;
        let user = test_user(&db, "alice").await;
        let feed = test_feed(&db, &user, 1).await;

        assert_eq!(feed.user_id, user.id);
        assert!(feed.last_fetched_at.is_none());

        let by_url = db
            .get_feed_by_url("https://feed1.example.com/rss")
            .await
            .unwrap();
        assert_eq!(by_url.id, feed.id);
    }

    #[tokio::test]
    async fn test_duplicate_feed_url() {
        let db = test_db().await;
        let user = test_user(&db, "alice").await;
        test_feed(&db, &user, 1).await;

        let now = Utc::now();
        let err = db
            .create_feed(
                Uuid::new_v4(),
                "Other name",
                "https://feed1.example.com/rss",
                user.id,
                now,
                now,
            )
            .await
            .unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_get_feed_by_unknown_url() {
        let db = test_db().await;
        let err = db.get_feed_by_url("https://nope.example.com").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "feed" }));
    }

    #[tokio::test]
    async fn test_list_feeds_with_owner() {
        let db = test_db().await;
        let alice = test_user(&db, "alice").await;
        let bob = test_user(&db, "bob").await;
        test_feed(&db, &bob, 2).await;
        test_feed(&db, &alice, 1).await;

        let feeds = db.list_feeds_with_owner().await.unwrap();
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].feed.name, "Feed 1");
        assert_eq!(feeds[0].owner, "alice");
        assert_eq!(feeds[1].feed.name, "Feed 2");
        assert_eq!(feeds[1].owner, "bob");
    }

    #[tokio::test]
    async fn test_next_feed_no_feeds() {
        let db = test_db().await;
        let err = db.get_next_feed_to_fetch().await.unwrap_err();
        assert!(matches!(err, StoreError::NoFeeds));
    }

    #[tokio::test]
    async fn test_next_feed_prefers_never_fetched() {
        let db = test_db().await;
        let user = test_user(&db, "alice").await;
        let fetched = test_feed(&db, &user, 1).await;
        let fresh = test_feed(&db, &user, 2).await;

        db.mark_feed_fetched(fetched.id, Utc::now() - Duration::days(30))
            .await
            .unwrap();

        let next = db.get_next_feed_to_fetch().await.unwrap();
        assert_eq!(next.id, fresh.id);
    }

    #[tokio::test]
    async fn test_next_feed_oldest_stamp_first() {
        let db = test_db().await;
        let user = test_user(&db, "alice").await;
        let a = test_feed(&db, &user, 1).await;
        let b = test_feed(&db, &user, 2).await;
        let now = Utc::now();

        db.mark_feed_fetched(a.id, now - Duration::hours(1))
            .await
            .unwrap();
        db.mark_feed_fetched(b.id, now - Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(db.get_next_feed_to_fetch().await.unwrap().id, b.id);

        // After stamping b it is no longer the oldest
        db.mark_feed_fetched(b.id, now).await.unwrap();
        assert_eq!(db.get_next_feed_to_fetch().await.unwrap().id, a.id);
    }

    #[tokio::test]
    async fn test_mark_feed_fetched_sets_stamp() {
        let db = test_db().await;
        let user = test_user(&db, "alice").await;
        let feed = test_feed(&db, &user, 1).await;
        let at = Utc::now();

        let updated = db.mark_feed_fetched(feed.id, at).await.unwrap();
        assert_eq!(
            updated.last_fetched_at.map(|t| t.timestamp_millis()),
            Some(at.timestamp_millis())
        );
    }

    #[tokio::test]
    async fn test_mark_unknown_feed_not_found() {
        let db = test_db().await;
        let err = db
            .mark_feed_fetched(Uuid::new_v4(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "feed" }));
    }

    #[tokio::test]
    async fn test_deleting_user_removes_their_feeds() {
        let db = test_db().await;
        let user = test_user(&db, "alice").await;
        test_feed(&db, &user, 1).await;

        db.delete_all_users().await.unwrap();
        assert!(db.list_feeds_with_owner().await.unwrap().is_empty());
    }
}

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::schema::Database;
use super::types::{to_millis, NewPost, Post, PostRow, PostWithFeed, StoreError};

const POST_COLUMNS: &str =
    "p.id, p.feed_id, p.title, p.url, p.description, p.published_at, p.created_at, p.updated_at";

#[derive(Debug, sqlx::FromRow)]
struct PostFeedRow {
    #[sqlx(flatten)]
    post: PostRow,
    feed_name: String,
}

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post.
    ///
    /// Post URLs are unique across the whole store; inserting a URL that is
    /// already known returns [`StoreError::Duplicate`] and leaves the existing
    /// row untouched.
    pub async fn create_post(
        &self,
        id: Uuid,
        post: &NewPost,
        created_at: DateTime<Utc>,
    ) -> Result<Post, StoreError> {
        let ts = to_millis(created_at);
        let row: PostRow = sqlx::query_as(
            r#"
            INSERT INTO posts (id, feed_id, title, url, description, published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, feed_id, title, url, description, published_at, created_at, updated_at
        "#,
        )
        .bind(id.to_string())
        .bind(post.feed_id.to_string())
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at.map(to_millis))
        .bind(ts)
        .bind(ts)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::on_insert("post", e))?;

        row.into_post()
    }

    /// Most recent posts from the feeds a user follows.
    ///
    /// Ordered by published date (newest first, undated last), then by
    /// ingestion time.
    pub async fn get_posts_for_user(
        &self,
        user_id: Uuid,
        limit: u32,
    ) -> Result<Vec<PostWithFeed>, StoreError> {
        let rows: Vec<PostFeedRow> = sqlx::query_as(&format!(
            r#"
            SELECT {POST_COLUMNS}, f.name AS feed_name
            FROM posts p
            JOIN feeds f ON f.id = p.feed_id
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            WHERE ff.user_id = ?
            ORDER BY p.published_at IS NULL, p.published_at DESC, p.created_at DESC
            LIMIT ?
        "#
        ))
        .bind(user_id.to_string())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(PostWithFeed {
                    post: r.post.into_post()?,
                    feed_name: r.feed_name,
                })
            })
            .collect()
    }

    /// Every post of one feed, in insertion order.
    ///
    /// No command lists posts per feed; this exists for inspecting what an
    /// ingestion cycle stored, and the ingestion tests rely on it.
    pub async fn get_posts_for_feed(&self, feed_id: Uuid) -> Result<Vec<Post>, StoreError> {
        let rows: Vec<PostRow> = sqlx::query_as(&format!(
            "SELECT {POST_COLUMNS} FROM posts p WHERE p.feed_id = ? ORDER BY p.created_at, p.rowid"
        ))
        .bind(feed_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PostRow::into_post).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Feed, User};
    use chrono::Duration;

    async fn setup() -> (Database, User, Feed) {
        let db = Database::open(":memory:").await.unwrap();
        let now = Utc::now();
        let user = db
            .create_user(Uuid::new_v4(), "alice", now, now)
            .await
            .unwrap();
        let feed = db
            .create_feed(
                Uuid::new_v4(),
                "Blog",
                "http://x/feed",
                user.id,
                now,
                now,
            )
            .await
            .unwrap();
        (db, user, feed)
    }

    fn new_post(feed: &Feed, slug: &str, published_at: Option<DateTime<Utc>>) -> NewPost {
        NewPost {
            feed_id: feed.id,
            title: format!("Post {}", slug),
            url: format!("https://example.com/{}", slug),
            description: Some("Summary".to_string()),
            published_at,
        }
    }

    #[tokio::test]
    async fn test_create_post() {
        let (db, _, feed) = setup().await;
        let post = db
            .create_post(Uuid::new_v4(), &new_post(&feed, "a", None), Utc::now())
            .await
            .unwrap();

        assert_eq!(post.feed_id, feed.id);
        assert_eq!(post.url, "https://example.com/a");
        assert!(post.published_at.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_post_url() {
        let (db, _, feed) = setup().await;
        db.create_post(Uuid::new_v4(), &new_post(&feed, "a", None), Utc::now())
            .await
            .unwrap();

        let mut again = new_post(&feed, "a", None);
        again.title = "Renamed".to_string();
        let err = db
            .create_post(Uuid::new_v4(), &again, Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_duplicate());

        let posts = db.get_posts_for_feed(feed.id).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "Post a");
    }

    #[tokio::test]
    async fn test_posts_for_user_only_followed_feeds() {
        let (db, user, feed) = setup().await;
        db.create_post(Uuid::new_v4(), &new_post(&feed, "a", None), Utc::now())
            .await
            .unwrap();

        // Not following yet
        assert!(db.get_posts_for_user(user.id, 10).await.unwrap().is_empty());

        let now = Utc::now();
        db.create_feed_follow(Uuid::new_v4(), user.id, feed.id, now, now)
            .await
            .unwrap();
        let posts = db.get_posts_for_user(user.id, 10).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].feed_name, "Blog");
    }

    #[tokio::test]
    async fn test_posts_for_user_order_and_limit() {
        let (db, user, feed) = setup().await;
        let now = Utc::now();
        db.create_feed_follow(Uuid::new_v4(), user.id, feed.id, now, now)
            .await
            .unwrap();

        db.create_post(Uuid::new_v4(), &new_post(&feed, "undated", None), now)
            .await
            .unwrap();
        db.create_post(
            Uuid::new_v4(),
            &new_post(&feed, "old", Some(now - Duration::days(2))),
            now,
        )
        .await
        .unwrap();
        db.create_post(
            Uuid::new_v4(),
            &new_post(&feed, "new", Some(now - Duration::hours(1))),
            now,
        )
        .await
        .unwrap();

        let urls: Vec<String> = db
            .get_posts_for_user(user.id, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.post.url)
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/new",
                "https://example.com/old",
                "https://example.com/undated",
            ]
        );

        let limited = db.get_posts_for_user(user.id, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }
}

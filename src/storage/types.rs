use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced by the persistence layer.
///
/// Constraint violations are classified from the driver's structured error
/// kind, so callers can match on [`StoreError::Duplicate`] instead of
/// inspecting message text.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row with the same unique key already exists
    #[error("{entity} already exists")]
    Duplicate { entity: &'static str },

    /// The referenced row does not exist
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    /// `get_next_feed_to_fetch` found no registered feeds
    #[error("no feeds registered")]
    NoFeeds,

    /// A stored column could not be decoded (e.g. a malformed id)
    #[error("corrupt {entity} row: {detail}")]
    Corrupt { entity: &'static str, detail: String },

    /// Schema setup failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Any other driver failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Classify an insert failure, turning unique violations into `Duplicate`.
    pub(crate) fn on_insert(entity: &'static str, err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Duplicate { entity }
            }
            _ => StoreError::Database(err),
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate { .. })
    }
}

// ============================================================================
// Timestamp helpers
// ============================================================================

/// Timestamps are stored as Unix milliseconds.
pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub(crate) fn parse_id(entity: &'static str, raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Corrupt {
        entity,
        detail: format!("id '{}': {}", raw, e),
    })
}

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A registered feed. `last_fetched_at` is `None` until the first successful
/// ingestion cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFollow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub feed_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Feed joined with the username of its creator
#[derive(Debug, Clone)]
pub struct FeedWithOwner {
    pub feed: Feed,
    pub owner: String,
}

/// Follow joined with the feed name and follower's username
#[derive(Debug, Clone)]
pub struct FollowDetails {
    pub follow: FeedFollow,
    pub feed_name: String,
    pub user_name: String,
}

/// Post joined with the name of the feed it came from
#[derive(Debug, Clone)]
pub struct PostWithFeed {
    pub post: Post,
    pub feed_name: String,
}

/// Parameters for a new post. Identity and timestamps are assigned by
/// [`crate::storage::Database::create_post`].
#[derive(Debug, Clone)]
pub struct NewPost {
    pub feed_id: Uuid,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Row types (sqlx FromRow)
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl UserRow {
    pub(crate) fn into_user(self) -> Result<User, StoreError> {
        Ok(User {
            id: parse_id("user", &self.id)?,
            name: self.name,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedRow {
    pub id: String,
    pub name: String,
    pub url: String,
    pub user_id: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_fetched_at: Option<i64>,
}

impl FeedRow {
    pub(crate) fn into_feed(self) -> Result<Feed, StoreError> {
        Ok(Feed {
            id: parse_id("feed", &self.id)?,
            name: self.name,
            url: self.url,
            user_id: parse_id("feed", &self.user_id)?,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
            last_fetched_at: self.last_fetched_at.map(from_millis),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedFollowRow {
    pub id: String,
    pub user_id: String,
    pub feed_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl FeedFollowRow {
    pub(crate) fn into_follow(self) -> Result<FeedFollow, StoreError> {
        Ok(FeedFollow {
            id: parse_id("follow", &self.id)?,
            user_id: parse_id("follow", &self.user_id)?,
            feed_id: parse_id("follow", &self.feed_id)?,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostRow {
    pub id: String,
    pub feed_id: String,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PostRow {
    pub(crate) fn into_post(self) -> Result<Post, StoreError> {
        Ok(Post {
            id: parse_id("post", &self.id)?,
            feed_id: parse_id("post", &self.feed_id)?,
            title: self.title,
            url: self.url,
            description: self.description,
            published_at: self.published_at.map(from_millis),
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        })
    }
}

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::StoreError;

// ============================================================================
// Database
// ============================================================================

/// Handle to the gator store. Cloning is cheap and shares the pool.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database and run migrations.
    ///
    /// `location` may be a full `sqlite:` URL, a filesystem path, or
    /// `:memory:`. In-memory databases get a single-connection pool so that
    /// every query sees the same data.
    pub async fn open(location: &str) -> Result<Self, StoreError> {
        let in_memory = location == ":memory:" || location.contains(":memory:");
        let url = if location.starts_with("sqlite:") {
            location.to_string()
        } else {
            format!("sqlite:{}?mode=rwc", location)
        };

        // busy_timeout=5000: wait up to 5 seconds for locks before SQLITE_BUSY,
        // so a one-shot command can run while `agg` is writing.
        let options = SqliteConnectOptions::from_str(&url)?
            .foreign_keys(true)
            .pragma("busy_timeout", "5000");

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .acquire_timeout(Duration::from_secs(10))
            // An idle in-memory connection must never be reaped: its data goes with it
            .idle_timeout(if in_memory { None } else { Some(Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(Duration::from_secs(1800)) })
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate()
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        tracing::debug!(location = %location, "Database opened");
        Ok(db)
    }

    /// Create all tables and indexes in a single transaction.
    ///
    /// Every statement uses `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                name TEXT UNIQUE NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                id TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                name TEXT NOT NULL,
                url TEXT UNIQUE NOT NULL,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                last_fetched_at INTEGER
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed_follows (
                id TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                feed_id TEXT NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                UNIQUE(user_id, feed_id)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                title TEXT NOT NULL,
                url TEXT UNIQUE NOT NULL,
                description TEXT,
                published_at INTEGER,
                feed_id TEXT NOT NULL REFERENCES feeds(id) ON DELETE CASCADE
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Scheduler pick: oldest last_fetched_at first
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_feeds_last_fetched ON feeds(last_fetched_at)",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_follows_user ON feed_follows(user_id)")
            .execute(&mut *tx)
            .await?;

        // browse: posts of followed feeds, newest published first
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_posts_feed_published ON posts(feed_id, published_at DESC)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::fetcher::{fetch_feed, FetchError};
use super::parser::FeedItem;
use crate::storage::{Database, NewPost, StoreError};

/// Errors that end one ingestion cycle.
///
/// None of these are fatal to the scheduler; the next tick starts a fresh
/// cycle.
#[derive(Debug, Error)]
pub enum IngestError {
    /// No feed has been registered yet
    #[error("no feeds to fetch; add one with `addfeed <name> <url>`")]
    NoFeeds,
    /// The feed could not be fetched or parsed. Its fetch stamp was not advanced.
    #[error("failed to fetch feed {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
    /// A store operation failed for a reason other than a duplicate post
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

/// Outcome of one successful cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub feed_id: Uuid,
    pub feed_name: String,
    pub feed_url: String,
    /// Items present in the fetched document
    pub items: usize,
    /// Posts newly created this cycle
    pub inserted: usize,
    /// Items whose URL was already stored
    pub duplicates: usize,
    /// Items dropped because they had no link
    pub skipped: usize,
    pub fetched_at: DateTime<Utc>,
}

/// Parse an RSS `pubDate`.
///
/// RSS dates use RFC 1123 / RFC 2822 (`Mon, 02 Jan 2006 15:04:05 MST`). The
/// result is normalized to UTC; anything unparsable yields `None` so the item
/// is stored without a published time instead of being rejected.
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Run one ingestion cycle: pick the stalest feed, fetch it, store new
/// items as posts, then stamp the feed as fetched.
///
/// The stamp is written once, after every item has been handled, so a crash
/// mid-loop leaves the feed as the next pick and its items are re-attempted
/// (already-stored URLs come back as duplicates and are skipped).
///
/// # Errors
///
/// - [`IngestError::NoFeeds`] - the store has no feeds
/// - [`IngestError::Fetch`] - fetch or parse failed; stamp untouched
/// - [`IngestError::Persistence`] - a non-duplicate store failure
pub async fn ingest_one_cycle(
    db: &Database,
    client: &reqwest::Client,
    deadline: Option<Duration>,
) -> Result<CycleReport, IngestError> {
    let feed = match db.get_next_feed_to_fetch().await {
        Ok(feed) => feed,
        Err(StoreError::NoFeeds) => return Err(IngestError::NoFeeds),
        Err(e) => return Err(e.into()),
    };

    tracing::debug!(feed = %feed.name, url = %feed.url, "Refreshing feed");

    let content = fetch_feed(client, &feed.url, deadline)
        .await
        .map_err(|source| IngestError::Fetch {
            url: feed.url.clone(),
            source,
        })?;

    let mut inserted = 0;
    let mut duplicates = 0;
    let mut skipped = 0;

    for item in &content.items {
        let Some(post) = to_new_post(feed.id, item) else {
            tracing::debug!(feed = %feed.name, title = %item.title, "Skipping item without link");
            skipped += 1;
            continue;
        };

        match db.create_post(Uuid::new_v4(), &post, Utc::now()).await {
            Ok(_) => inserted += 1,
            Err(StoreError::Duplicate { .. }) => duplicates += 1,
            Err(e) => return Err(e.into()),
        }
    }

    let now = Utc::now();
    // Report the stamp as stored, at the store's precision
    let fetched_at = db
        .mark_feed_fetched(feed.id, now)
        .await?
        .last_fetched_at
        .unwrap_or(now);

    Ok(CycleReport {
        feed_id: feed.id,
        feed_name: feed.name,
        feed_url: feed.url,
        items: content.items.len(),
        inserted,
        duplicates,
        skipped,
        fetched_at,
    })
}

fn to_new_post(feed_id: Uuid, item: &FeedItem) -> Option<NewPost> {
    if item.link.is_empty() {
        return None;
    }

    let published_at = parse_pub_date(&item.pub_date);
    if published_at.is_none() && !item.pub_date.is_empty() {
        tracing::debug!(url = %item.link, pub_date = %item.pub_date, "Unparsable publish date");
    }

    Some(NewPost {
        feed_id,
        title: item.title.clone(),
        url: item.link.clone(),
        description: (!item.description.is_empty()).then(|| item.description.clone()),
        published_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::build_client;
    use chrono::TimeZone;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_pub_date_rfc1123() {
        let parsed = parse_pub_date("Mon, 02 Jan 2006 15:04:05 GMT").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap());
    }

    #[test]
    fn test_parse_pub_date_normalizes_offset() {
        let parsed = parse_pub_date("Mon, 02 Jan 2006 15:04:05 -0700").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2006, 1, 2, 22, 4, 5).unwrap());
    }

    #[test]
    fn test_parse_pub_date_rejects_other_formats() {
        assert!(parse_pub_date("2006-01-02T15:04:05Z").is_none());
        assert!(parse_pub_date("yesterday").is_none());
        assert!(parse_pub_date("").is_none());
    }

    #[test]
    fn test_to_new_post_keeps_bad_date_item() {
        let item = FeedItem {
            title: "T".into(),
            description: String::new(),
            link: "https://example.com/t".into(),
            pub_date: "not a date".into(),
        };
        let post = to_new_post(Uuid::nil(), &item).unwrap();
        assert!(post.published_at.is_none());
        assert!(post.description.is_none());
        assert_eq!(post.url, "https://example.com/t");
    }

    #[test]
    fn test_to_new_post_requires_link() {
        let item = FeedItem {
            title: "No link".into(),
            ..Default::default()
        };
        assert!(to_new_post(Uuid::nil(), &item).is_none());
    }

    #[tokio::test]
    async fn test_store_failure_aborts_cycle_without_stamp() {
        let server = MockServer::start().await;
        let body = r#"<rss><channel><title>T</title>
            <item><title>ok</title><link>https://t.example/ok</link></item>
            <item><title>bad</title><link>https://t.example/boom</link></item>
            <item><title>never</title><link>https://t.example/later</link></item>
        </channel></rss>"#;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_boom BEFORE INSERT ON posts \
             WHEN NEW.url LIKE '%boom%' BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(&db.pool)
        .await
        .unwrap();

        let now = Utc::now();
        let user = db.create_user(Uuid::new_v4(), "alice", now, now).await.unwrap();
        let feed = db
            .create_feed(Uuid::new_v4(), "T", &server.uri(), user.id, now, now)
            .await
            .unwrap();

        let client = build_client().unwrap();
        let err = ingest_one_cycle(&db, &client, None).await.unwrap_err();
        assert!(matches!(err, IngestError::Persistence(StoreError::Database(_))), "{err:?}");

        let after = db.get_feed_by_url(&feed.url).await.unwrap();
        assert!(after.last_fetched_at.is_none());
        let posts = db.get_posts_for_feed(feed.id).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].url, "https://t.example/ok");
    }
}

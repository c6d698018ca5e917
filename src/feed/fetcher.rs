use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use super::parser::{parse_feed, FeedContent};

/// Value of the `User-Agent` header on every feed request
pub const USER_AGENT: &str = "gator";

/// Largest feed body accepted, in bytes
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024;

/// Errors that can occur while retrieving a feed.
///
/// Nothing here is retried: a failed fetch ends the current ingestion cycle
/// and the feed is picked again on a later one.
#[derive(Debug, Error)]
pub enum FetchError {
    /// DNS, connection, TLS or body-read failure
    #[error("feed request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Any status outside 2xx
    #[error("feed server answered with status {0}")]
    HttpStatus(u16),
    /// The caller-supplied deadline elapsed
    #[error("feed request exceeded its {0:?} deadline")]
    Timeout(Duration),
    /// Body is not decodable RSS markup
    #[error("feed body is not valid RSS: {0}")]
    Parse(String),
    #[error("feed body is larger than {} bytes", MAX_FEED_SIZE)]
    ResponseTooLarge,
}

/// Build the HTTP client shared by every fetch in a process.
///
/// Carries the fixed identifying `User-Agent`; redirects and TLS use the
/// reqwest defaults.
pub fn build_client() -> Result<reqwest::Client, FetchError> {
    let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
    Ok(client)
}

/// Fetch and parse the RSS document at `url`.
///
/// When `deadline` is `Some`, the whole request (headers and body) must
/// finish within it or [`FetchError::Timeout`] is returned. `None` means no
/// timeout is enforced.
///
/// # Errors
///
/// - [`FetchError::Network`] - connection failure or interrupted body
/// - [`FetchError::HttpStatus`] - non-2xx response
/// - [`FetchError::Timeout`] - deadline exceeded
/// - [`FetchError::ResponseTooLarge`] - body over 10MB
/// - [`FetchError::Parse`] - malformed markup, missing `<channel>`, non-UTF-8 body
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    deadline: Option<Duration>,
) -> Result<FeedContent, FetchError> {
    let bytes = match deadline {
        Some(limit) => tokio::time::timeout(limit, fetch_bytes(client, url))
            .await
            .map_err(|_| FetchError::Timeout(limit))??,
        None => fetch_bytes(client, url).await?,
    };

    let feed = parse_feed(&bytes).map_err(|e| FetchError::Parse(format!("{:#}", e)))?;

    tracing::debug!(
        url = %url,
        title = %feed.title,
        items = feed.items.len(),
        "Fetched feed"
    );
    Ok(feed)
}

async fn fetch_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    read_limited_bytes(response, MAX_FEED_SIZE).await
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // A declared length can be rejected before reading anything
    let declared = response.content_length();
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(FetchError::ResponseTooLarge);
    }

    let capacity = declared.map_or(0, |len| len as usize);
    let mut body = Vec::with_capacity(capacity);
    let mut chunks = response.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        if body.len() + chunk.len() > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

//! Feed polling: fetching, parsing and ingesting RSS feeds.
//!
//! - [`fetcher`] - HTTP retrieval with an optional per-request deadline
//! - [`parser`] - RSS 2.0 markup into [`FeedContent`], entity-decoded
//! - [`ingest`] - one "pick stalest feed, fetch, store posts, stamp" cycle
//! - [`scheduler`] - runs cycles on a fixed interval until shut down
//!
//! # Example
//!
//! ```ignore
//! use gator::feed::{build_client, ingest_one_cycle, scheduler};
//!
//! let client = build_client()?;
//! scheduler::run(interval, tokio::signal::ctrl_c().map(|_| ()), || {
//!     ingest_one_cycle(&db, &client, None)
//! })
//! .await;
//! ```

pub mod fetcher;
pub mod ingest;
pub mod parser;
pub mod scheduler;

pub use fetcher::{build_client, fetch_feed, FetchError, USER_AGENT};
pub use ingest::{ingest_one_cycle, parse_pub_date, CycleReport, IngestError};
pub use parser::{parse_feed, FeedContent, FeedItem};

use chrono::Utc;
use futures::future::BoxFuture;
use std::time::Duration;
use uuid::Uuid;

use super::duration::{format_duration, parse_duration};
use super::output;
use super::{CommandError, HandlerResult};
use crate::feed::{ingest_one_cycle, scheduler, CycleReport, IngestError};
use crate::session::Session;
use crate::storage::{Database, StoreError};

/// Posts shown by `browse` when no limit is given
pub const DEFAULT_BROWSE_LIMIT: u32 = 2;

/// Wrap an `async fn(&mut Session, &[String])` into a [`super::Handler`].
macro_rules! handler {
    ($name:ident => $body:ident) => {
        pub fn $name<'a>(
            session: &'a mut Session,
            args: &'a [String],
        ) -> BoxFuture<'a, HandlerResult> {
            Box::pin($body(session, args))
        }
    };
}

handler!(login => handle_login);
handler!(register => handle_register);
handler!(reset => handle_reset);
handler!(users => handle_users);
handler!(agg => handle_agg);
handler!(add_feed => handle_add_feed);
handler!(feeds => handle_feeds);
handler!(follow => handle_follow);
handler!(following => handle_following);
handler!(unfollow => handle_unfollow);
handler!(browse => handle_browse);

/// Exactly `N` arguments, or a usage error with `usage`
fn expect_args<'a, const N: usize>(
    args: &'a [String],
    usage: &str,
) -> Result<[&'a str; N], CommandError> {
    if args.len() != N {
        return Err(CommandError::Usage(usage.to_string()));
    }
    Ok(std::array::from_fn(|i| args[i].as_str()))
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// Users
// ============================================================================

async fn handle_login(session: &mut Session, args: &[String]) -> HandlerResult {
    let [name] = expect_args::<1>(args, "login <username>")?;

    match session.db.get_user_by_username(name).await {
        Ok(_) => {}
        Err(StoreError::NotFound { .. }) => {
            return Err(CommandError::NotFound(format!("user '{}' does not exist", name)));
        }
        Err(e) => return Err(e.into()),
    }

    session.set_current_user(name)?;
    tracing::info!(user = %name, "Logged in");
    println!("User set to: {}", name);
    Ok(())
}

async fn handle_register(session: &mut Session, args: &[String]) -> HandlerResult {
    let [name] = expect_args::<1>(args, "register <username>")?;
    if name.trim().is_empty() {
        return Err(CommandError::Usage("register <username>".to_string()));
    }

    let now = Utc::now();
    let user = match session.db.create_user(Uuid::new_v4(), name, now, now).await {
        Ok(user) => user,
        Err(StoreError::Duplicate { .. }) => {
            return Err(CommandError::Duplicate(format!("user '{}' already exists", name)));
        }
        Err(e) => return Err(e.into()),
    };

    session.set_current_user(&user.name)?;
    tracing::info!(user = %user.name, id = %user.id, "Registered user");
    println!("User '{}' created", user.name);
    Ok(())
}

async fn handle_reset(session: &mut Session, args: &[String]) -> HandlerResult {
    let [] = expect_args::<0>(args, "reset")?;

    let removed = session.db.delete_all_users().await?;
    tracing::info!(users = removed, "Database reset");
    println!("Database reset: removed {} user(s)", removed);
    Ok(())
}

async fn handle_users(session: &mut Session, args: &[String]) -> HandlerResult {
    let [] = expect_args::<0>(args, "users")?;

    let users = session.db.list_users().await?;
    print_lines(&output::format_users(&users, session.current_user_name()));
    Ok(())
}

// ============================================================================
// Aggregation
// ============================================================================

async fn handle_agg(session: &mut Session, args: &[String]) -> HandlerResult {
    const USAGE: &str = "agg <time_between_reqs>  (e.g. 30s, 1m, 1h30m)";
    let [raw] = expect_args::<1>(args, USAGE)?;

    let interval = parse_duration(raw)
        .map_err(|e| CommandError::Usage(format!("{} ({})", USAGE, e)))?;
    if interval.is_zero() {
        return Err(CommandError::Usage(format!("{} (interval must be positive)", USAGE)));
    }

    let deadline = session.config.fetch_timeout();
    println!("Collecting feeds every {}", format_duration(interval));
    tracing::info!(
        interval = %format_duration(interval),
        timeout = ?deadline,
        "Starting aggregation"
    );

    let db = &session.db;
    let client = &session.client;
    scheduler::run(interval, interrupted(), move || {
        run_cycle(db, client, deadline)
    })
    .await;

    Ok(())
}

async fn run_cycle(
    db: &Database,
    client: &reqwest::Client,
    deadline: Option<Duration>,
) -> Result<CycleReport, IngestError> {
    let report = ingest_one_cycle(db, client, deadline).await?;
    tracing::info!(
        feed = %report.feed_name,
        items = report.items,
        new = report.inserted,
        known = report.duplicates,
        skipped = report.skipped,
        "Feed collected"
    );
    Ok(report)
}

/// Resolves on Ctrl-C. If the signal handler cannot be installed, never
/// resolves, leaving process termination as the only way out.
async fn interrupted() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received interrupt, stopping aggregation"),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

// ============================================================================
// Feeds and follows
// ============================================================================

async fn handle_add_feed(session: &mut Session, args: &[String]) -> HandlerResult {
    let [name, url] = expect_args::<2>(args, "addfeed <name> <url>")?;
    let user = session.current_user().await?;
    validate_feed_url(url)?;

    let now = Utc::now();
    let feed = match session
        .db
        .create_feed(Uuid::new_v4(), name, url, user.id, now, now)
        .await
    {
        Ok(feed) => feed,
        Err(StoreError::Duplicate { .. }) => {
            return Err(CommandError::Duplicate(format!(
                "a feed with URL '{}' already exists; use `follow {}`",
                url, url
            )));
        }
        Err(e) => return Err(e.into()),
    };

    match session
        .db
        .create_feed_follow(Uuid::new_v4(), user.id, feed.id, now, now)
        .await
    {
        Ok(_) => {}
        Err(StoreError::Duplicate { .. }) => {
            tracing::debug!(feed = %feed.name, user = %user.name, "Already following new feed");
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!(feed = %feed.name, url = %feed.url, user = %user.name, "Feed added");
    println!("Feed created and followed: {} ({})", feed.name, feed.url);
    Ok(())
}

fn validate_feed_url(raw: &str) -> Result<(), CommandError> {
    let invalid = |reason: String| CommandError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };

    let parsed = url::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme '{}'", other))),
    }
    if parsed.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(())
}

async fn handle_feeds(session: &mut Session, args: &[String]) -> HandlerResult {
    let [] = expect_args::<0>(args, "feeds")?;

    let feeds = session.db.list_feeds_with_owner().await?;
    print_lines(&output::format_feeds(&feeds));
    Ok(())
}

async fn handle_follow(session: &mut Session, args: &[String]) -> HandlerResult {
    let [url] = expect_args::<1>(args, "follow <feed_url>")?;
    let user = session.current_user().await?;
    let feed = feed_by_url(&session.db, url).await?;

    let now = Utc::now();
    match session
        .db
        .create_feed_follow(Uuid::new_v4(), user.id, feed.id, now, now)
        .await
    {
        Ok(_) => {}
        Err(StoreError::Duplicate { .. }) => {
            return Err(CommandError::Duplicate(format!(
                "{} already follows '{}'",
                user.name, feed.name
            )));
        }
        Err(e) => return Err(e.into()),
    }

    println!("Following feed: {} (user: {})", feed.name, user.name);
    Ok(())
}

async fn handle_following(session: &mut Session, args: &[String]) -> HandlerResult {
    let [] = expect_args::<0>(args, "following")?;
    let user = session.current_user().await?;

    let follows = session.db.list_follows_for_user(user.id).await?;
    print_lines(&output::format_following(&user.name, &follows));
    Ok(())
}

async fn handle_unfollow(session: &mut Session, args: &[String]) -> HandlerResult {
    let [url] = expect_args::<1>(args, "unfollow <feed_url>")?;
    let user = session.current_user().await?;
    let feed = feed_by_url(&session.db, url).await?;

    match session.db.delete_feed_follow(user.id, feed.id).await {
        Ok(()) => {}
        Err(StoreError::NotFound { .. }) => {
            return Err(CommandError::NotFound(format!(
                "{} does not follow '{}'",
                user.name, feed.url
            )));
        }
        Err(e) => return Err(e.into()),
    }

    println!("Unfollowed feed: {}", feed.name);
    Ok(())
}

async fn feed_by_url(db: &Database, url: &str) -> Result<crate::storage::Feed, CommandError> {
    match db.get_feed_by_url(url).await {
        Ok(feed) => Ok(feed),
        Err(StoreError::NotFound { .. }) => Err(CommandError::NotFound(format!(
            "no feed registered with URL '{}'",
            url
        ))),
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Posts
// ============================================================================

/// Parse the optional `browse` limit
pub(crate) fn parse_browse_limit(args: &[String]) -> Result<u32, CommandError> {
    const USAGE: &str = "browse [limit]  (limit must be a positive number)";
    match args {
        [] => Ok(DEFAULT_BROWSE_LIMIT),
        [raw] => match raw.parse::<u32>() {
            Ok(limit) if limit > 0 => Ok(limit),
            _ => Err(CommandError::Usage(USAGE.to_string())),
        },
        _ => Err(CommandError::Usage(USAGE.to_string())),
    }
}

async fn handle_browse(session: &mut Session, args: &[String]) -> HandlerResult {
    let limit = parse_browse_limit(args)?;
    let user = session.current_user().await?;

    let posts = session.db.get_posts_for_user(user.id, limit).await?;
    print_lines(&output::format_posts(&user.name, &posts));
    Ok(())
}

//! Plain-text rendering for command output.
//!
//! Each helper returns the lines to print so tests can check them without
//! capturing stdout.

use crate::storage::{FeedWithOwner, FollowDetails, PostWithFeed, User};
use crate::util::{strip_control_chars as safe, truncate_to_width};

/// Display width a post description is cut to in `browse`
pub const DESCRIPTION_WIDTH: usize = 200;

const POST_SEPARATOR: &str = "=====================================";

pub fn format_users(users: &[User], current: Option<&str>) -> Vec<String> {
    if users.is_empty() {
        return vec!["No users registered".to_string()];
    }

    users
        .iter()
        .map(|user| {
            if current == Some(user.name.as_str()) {
                format!("* {} (current)", safe(&user.name))
            } else {
                format!("  {}", safe(&user.name))
            }
        })
        .collect()
}

pub fn format_feeds(feeds: &[FeedWithOwner]) -> Vec<String> {
    if feeds.is_empty() {
        return vec!["No feeds registered".to_string()];
    }

    let rows = feeds.iter().map(|e| {
        format!(
            " * {} ({}) - {}",
            safe(&e.feed.name),
            safe(&e.feed.url),
            safe(&e.owner)
        )
    });
    std::iter::once("Feeds:".to_string()).chain(rows).collect()
}

pub fn format_following(user_name: &str, follows: &[FollowDetails]) -> Vec<String> {
    if follows.is_empty() {
        return vec![format!("{} is not following any feeds", user_name)];
    }

    std::iter::once(format!("Feeds {} is following:", user_name))
        .chain(follows.iter().map(|f| format!(" * {}", safe(&f.feed_name))))
        .collect()
}

/// Render posts for `browse`, newest first as given.
///
/// Descriptions are flattened to one line before truncation. Stored text is
/// already entity-decoded and is printed as is, minus control sequences.
pub fn format_posts(user_name: &str, posts: &[PostWithFeed]) -> Vec<String> {
    if posts.is_empty() {
        return vec![format!("No posts yet for {}; follow a feed and run `agg`", user_name)];
    }

    let mut lines = vec![format!("Found {} post(s) for {}:", posts.len(), user_name)];
    for entry in posts {
        let post = &entry.post;
        let published = post
            .published_at
            .map(|at| at.format("%a %b %e %Y %H:%M UTC").to_string())
            .unwrap_or_else(|| "unknown date".to_string());

        lines.push(format!("{} from {}", published, safe(&entry.feed_name)));
        lines.push(format!("--- {} ---", safe(&post.title)));
        if let Some(description) = post.description.as_deref() {
            let flat = safe(description)
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if !flat.is_empty() {
                lines.push(format!("    {}", truncate_to_width(&flat, DESCRIPTION_WIDTH)));
            }
        }
        lines.push(format!("Link: {}", safe(&post.url)));
        lines.push(POST_SEPARATOR.to_string());
    }
    lines
}

//! Command dispatcher: maps a command name to its handler.
//!
//! Handlers receive the mutable [`Session`] and the raw arguments that
//! followed the command name. They keep no state of their own; anything that
//! must outlive one invocation goes through the session's config or the
//! store.

mod duration;
mod handlers;
mod output;

use futures::future::BoxFuture;
use std::collections::HashMap;
use thiserror::Error;

use crate::config::ConfigError;
use crate::session::{CurrentUserError, Session};
use crate::storage::StoreError;

pub use duration::{format_duration, parse_duration, DurationError};
pub use output::{format_feeds, format_following, format_posts, format_users};

/// Errors a command can end with. Every variant makes the process exit non-zero.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Missing, extra or malformed arguments
    #[error("usage: {0}")]
    Usage(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("not logged in; run `login <username>` or `register <username>` first")]
    NotLoggedIn,

    /// The config points at a username the store no longer has
    #[error("current user '{0}' does not exist; log in again")]
    UnknownUser(String),

    #[error("{0}")]
    Duplicate(String),

    #[error("{0}")]
    NotFound(String),

    #[error("invalid feed URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl From<CurrentUserError> for CommandError {
    fn from(err: CurrentUserError) -> Self {
        match err {
            CurrentUserError::NotLoggedIn => CommandError::NotLoggedIn,
            CurrentUserError::UnknownUser(name) => CommandError::UnknownUser(name),
            CurrentUserError::Store(e) => CommandError::Persistence(e),
        }
    }
}

pub type HandlerResult = Result<(), CommandError>;

/// A command handler. Boxed future so handlers of different bodies share one type.
pub type Handler = for<'a> fn(&'a mut Session, &'a [String]) -> BoxFuture<'a, HandlerResult>;

/// One parsed invocation: the command name and everything after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
}

impl Command {
    pub fn new(name: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Name → handler registry
#[derive(Default)]
pub struct Commands {
    handlers: HashMap<String, Handler>,
}

impl Commands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all built-in commands.
    pub fn builtin() -> Self {
        let mut commands = Self::new();
        commands.register("login", handlers::login);
        commands.register("register", handlers::register);
        commands.register("reset", handlers::reset);
        commands.register("users", handlers::users);
        commands.register("agg", handlers::agg);
        commands.register("addfeed", handlers::add_feed);
        commands.register("feeds", handlers::feeds);
        commands.register("follow", handlers::follow);
        commands.register("following", handlers::following);
        commands.register("unfollow", handlers::unfollow);
        commands.register("browse", handlers::browse);
        commands
    }

    /// Register `handler` under `name`, replacing any earlier handler.
    pub fn register(&mut self, name: &str, handler: Handler) {
        if self.handlers.insert(name.to_string(), handler).is_some() {
            tracing::debug!(command = %name, "Replaced command handler");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Sorted command names, for usage output
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Look up `command.name` and run its handler.
    pub async fn run(&self, session: &mut Session, command: &Command) -> HandlerResult {
        let handler = self
            .handlers
            .get(&command.name)
            .ok_or_else(|| CommandError::UnknownCommand(command.name.clone()))?;

        tracing::debug!(command = %command.name, args = ?command.args, "Dispatching command");
        handler(session, &command.args).await
    }
}

use std::path::PathBuf;
use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::storage::{Database, StoreError, User};

/// Process-local state threaded through every command handler.
///
/// Owns the loaded config (and with it the current-user pointer), the store
/// handle and the HTTP client. Only `login` and `register` change the
/// current user; the write goes straight back to `config_path`.
pub struct Session {
    pub config: Config,
    pub config_path: PathBuf,
    pub db: Database,
    pub client: reqwest::Client,
}

/// Why the current user could not be resolved
#[derive(Debug, Error)]
pub enum CurrentUserError {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("current user '{0}' does not exist")]
    UnknownUser(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Session {
    pub fn new(config: Config, config_path: PathBuf, db: Database, client: reqwest::Client) -> Self {
        Self {
            config,
            config_path,
            db,
            client,
        }
    }

    pub fn current_user_name(&self) -> Option<&str> {
        self.config
            .current_user_name
            .as_deref()
            .filter(|name| !name.is_empty())
    }

    /// Resolve the current-user pointer against the store.
    pub async fn current_user(&self) -> Result<User, CurrentUserError> {
        let name = self.current_user_name().ok_or(CurrentUserError::NotLoggedIn)?;
        match self.db.get_user_by_username(name).await {
            Ok(user) => Ok(user),
            Err(StoreError::NotFound { .. }) => Err(CurrentUserError::UnknownUser(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Point the session at `name` and rewrite the config file.
    pub fn set_current_user(&mut self, name: &str) -> Result<(), ConfigError> {
        self.config.set_user(name, &self.config_path)
    }
}

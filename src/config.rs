//! Configuration file for gator, `~/.gatorconfig.toml` by default.
//!
//! Holds the database location and the name of the current user. The file is
//! read once at startup and rewritten wholesale whenever `login` or
//! `register` changes the current user.
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name of the config inside the home directory
pub const CONFIG_FILE_NAME: &str = ".gatorconfig.toml";

/// Database file used when `db_url` is not set
pub const DEFAULT_DB_FILE_NAME: &str = ".gator.db";

const KNOWN_KEYS: [&str; 3] = ["db_url", "current_user_name", "fetch_timeout_secs"];

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("HOME environment variable not set")]
    NoHome,
}

// ============================================================================
// Configuration
// ============================================================================

/// Persisted session settings.
///
/// All fields use `#[serde(default)]`, so an empty file is a valid config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite URL or file path. Empty means `~/.gator.db`.
    pub db_url: String,

    /// Username of the logged-in user, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_user_name: Option<String>,

    /// Per-request deadline for feed fetches during `agg`. Unset means no timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_timeout_secs: Option<u64>,
}

/// `$HOME/.gatorconfig.toml`
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(home_dir()?.join(CONFIG_FILE_NAME))
}

fn home_dir() -> Result<PathBuf, ConfigError> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .ok_or(ConfigError::NoHome)
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            user = ?config.current_user_name,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Write the whole config to `path`.
    ///
    /// Writes to a sibling temp file, syncs it, then renames over `path`, so
    /// the destination is never left half-written.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let body = toml::to_string_pretty(self)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| CONFIG_FILE_NAME.to_string());
        let temp_path = path.with_file_name(format!("{}.tmp.{}", file_name, uuid::Uuid::new_v4()));

        let write_result = (|| -> std::io::Result<()> {
            let mut temp_file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)?;
            temp_file.write_all(body.as_bytes())?;
            temp_file.sync_all()?;
            drop(temp_file);

            // Windows refuses to rename over an existing file
            #[cfg(windows)]
            if path.exists() {
                std::fs::remove_file(path)?;
            }

            std::fs::rename(&temp_path, path)
        })();

        if let Err(e) = write_result {
            let _ = std::fs::remove_file(&temp_path);
            return Err(ConfigError::Io(e));
        }

        tracing::debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Set the current user and persist the change.
    pub fn set_user(&mut self, name: &str, path: &Path) -> Result<(), ConfigError> {
        self.current_user_name = Some(name.to_string());
        self.save(path)
    }

    /// Database location to open: `db_url` if set, otherwise `~/.gator.db`.
    pub fn database_location(&self) -> Result<String, ConfigError> {
        if !self.db_url.trim().is_empty() {
            return Ok(self.db_url.clone());
        }
        Ok(home_dir()?
            .join(DEFAULT_DB_FILE_NAME)
            .to_string_lossy()
            .into_owned())
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================

//! # Database Configuration
//!
//! Pool sizing, timeouts and retry settings for a [`Database`](crate::Database).
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     REPOKIT_DATABASE_PATH=/var/lib/app/app.db                          │
//! │     REPOKIT_MAX_CONNECTIONS=8                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/repokit/database.toml (Linux)                            │
//! │     ~/Library/Application Support/dev.repokit.repokit/database.toml    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     repokit.db, 5 connections, 3 retries                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # database.toml
//! database_path = "./data/app.db"
//! max_connections = 5
//! min_connections = 1
//! connect_timeout_secs = 30
//! idle_timeout_secs = 600
//! foreign_keys = true
//!
//! [retry]
//! max_retries = 3
//! initial_backoff_ms = 50
//! max_backoff_ms = 2000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Path that selects a private in-memory database.
pub const IN_MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Errors
// =============================================================================

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Retry Settings
// =============================================================================

/// Retry behavior for flushes and transactions hitting transient failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries after the first attempt. 0 disables retrying.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound for any single delay (milliseconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    50
}

fn default_max_backoff() -> u64 {
    2_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl RetrySettings {
    /// No retries at all.
    pub fn disabled() -> Self {
        RetrySettings {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/app.db")
///     .max_connections(5)
///     .min_connections(1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Path to the SQLite database file, or `:memory:`.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout (seconds).
    /// Default: 30
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout before closing a connection (seconds).
    /// Default: 600
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Whether SQLite enforces foreign keys.
    /// Default: true
    #[serde(default = "default_foreign_keys")]
    pub foreign_keys: bool,

    /// Retry settings for the execution strategy.
    #[serde(default)]
    pub retry: RetrySettings,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("repokit.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_foreign_keys() -> bool {
    true
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig::new(default_database_path())
    }
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    ///
    /// ## Arguments
    /// * `path` - Path to the SQLite database file. Will be created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            foreign_keys: default_foreign_keys(),
            retry: RetrySettings::default(),
        }
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// The pool is pinned to one connection that never expires, since every
    /// new connection to `:memory:` would open an empty database.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(IN_MEMORY_PATH),
            max_connections: 1,
            min_connections: 1,
            connect_timeout_secs: 5,
            ..DbConfig::new(IN_MEMORY_PATH)
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets foreign key enforcement.
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Sets the retry settings.
    pub fn retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY_PATH
    }

    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Loads configuration: defaults, then the TOML file, then `REPOKIT_*`
    /// environment variables, then validation.
    ///
    /// ## Arguments
    /// * `config_path` - Explicit file; falls back to the platform config dir
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading database config from file");
                config = Self::from_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML file without applying overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database_path must not be empty".into()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::Invalid(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "retry.initial_backoff_ms exceeds retry.max_backoff_ms".into(),
            ));
        }

        Ok(())
    }

    /// Applies `REPOKIT_*` overrides read through `lookup`.
    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: String) -> Result<T, ConfigError> {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        }

        if let Some(path) = lookup("REPOKIT_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database_path = PathBuf::from(path);
        }

        if let Some(raw) = lookup("REPOKIT_MAX_CONNECTIONS") {
            self.max_connections = parse("REPOKIT_MAX_CONNECTIONS", raw)?;
        }

        if let Some(raw) = lookup("REPOKIT_MIN_CONNECTIONS") {
            self.min_connections = parse("REPOKIT_MIN_CONNECTIONS", raw)?;
        }

        if let Some(raw) = lookup("REPOKIT_CONNECT_TIMEOUT_SECS") {
            self.connect_timeout_secs = parse("REPOKIT_CONNECT_TIMEOUT_SECS", raw)?;
        }

        if let Some(raw) = lookup("REPOKIT_FOREIGN_KEYS") {
            self.foreign_keys = parse("REPOKIT_FOREIGN_KEYS", raw)?;
        }

        if let Some(raw) = lookup("REPOKIT_MAX_RETRIES") {
            self.retry.max_retries = parse("REPOKIT_MAX_RETRIES", raw)?;
        }

        Ok(())
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "repokit", "repokit")
            .map(|dirs| dirs.config_dir().join("database.toml"))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

//! Configuration management for Quill
//!
//! Defaults, a TOML file, and `QUILL_<SECTION>_<KEY>` environment overrides,
//! applied in that order and validated once at the end.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

use crate::logging::LogLevel;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP / WebSocket server
    pub server: ServerConfig,

    /// Access store
    pub store: StoreConfig,

    /// Ownership transfer retries
    pub transfer: TransferConfig,

    /// Artifact cleanup job
    pub cleanup: CleanupConfig,

    /// Invite links
    pub invite: InviteConfig,

    /// Bearer tokens
    pub auth: AuthConfig,

    /// Logging
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Maximum pooled connections
    pub pool_size: u32,

    /// How long a connection waits on a locked database
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,
}

/// Ownership transfer retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Backoff after the first conflict; doubles per attempt
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
}

/// Artifact cleanup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Time between batches
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Age after which an artifact is deleted
    #[serde(with = "humantime_serde")]
    pub retention: Duration,

    /// Deletions in flight at once
    pub max_concurrency: usize,

    /// Root directory of the filesystem object store
    pub media_root: PathBuf,
}

/// Invite configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InviteConfig {
    /// Base URL of the web client; invite and registration links hang off it
    pub frontend_url: String,
}

/// Token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// MAC secret for bearer tokens
    pub secret: String,

    #[serde(with = "humantime_serde")]
    pub access_ttl: Duration,

    #[serde(with = "humantime_serde")]
    pub refresh_ttl: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include target module
    pub with_target: bool,
}

/// Development secret; the server warns when it is still in use
pub const DEFAULT_AUTH_SECRET: &str = "quill-dev-secret";

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 9091)),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/quill.db"),
            pool_size: 8,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(20 * 60),
            retention: Duration::from_secs(20 * 60),
            max_concurrency: 10,
            media_root: PathBuf::from("./data/media"),
        }
    }
}

impl Default for InviteConfig {
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:3000".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: DEFAULT_AUTH_SECRET.to_string(),
            access_ttl: Duration::from_secs(60 * 60),
            refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_target: true,
        }
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        })
}

fn parse_duration(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw.trim())
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        })
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: QUILL_<SECTION>_<KEY>
    /// Example: QUILL_SERVER_BIND_ADDRESS=0.0.0.0:9091
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// File (if any) over defaults, then environment over both
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `QUILL_*` values returned by `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| lookup(key).map(|v| (key, v));

        // Server
        if let Some((k, v)) = get("QUILL_SERVER_BIND_ADDRESS") {
            self.server.bind_address = parse_value(k, &v)?;
        }
        if let Some((k, v)) = get("QUILL_SERVER_SHUTDOWN_TIMEOUT") {
            self.server.shutdown_timeout = parse_duration(k, &v)?;
        }

        // Store
        if let Some((_, v)) = get("QUILL_STORE_DATABASE_PATH") {
            self.store.database_path = PathBuf::from(v);
        }
        if let Some((k, v)) = get("QUILL_STORE_POOL_SIZE") {
            self.store.pool_size = parse_value(k, &v)?;
        }
        if let Some((k, v)) = get("QUILL_STORE_BUSY_TIMEOUT") {
            self.store.busy_timeout = parse_duration(k, &v)?;
        }

        // Transfer
        if let Some((k, v)) = get("QUILL_TRANSFER_MAX_ATTEMPTS") {
            self.transfer.max_attempts = parse_value(k, &v)?;
        }
        if let Some((k, v)) = get("QUILL_TRANSFER_INITIAL_BACKOFF") {
            self.transfer.initial_backoff = parse_duration(k, &v)?;
        }

        // Cleanup
        if let Some((k, v)) = get("QUILL_CLEANUP_INTERVAL") {
            self.cleanup.interval = parse_duration(k, &v)?;
        }
        if let Some((k, v)) = get("QUILL_CLEANUP_RETENTION") {
            self.cleanup.retention = parse_duration(k, &v)?;
        }
        if let Some((k, v)) = get("QUILL_CLEANUP_MAX_CONCURRENCY") {
            self.cleanup.max_concurrency = parse_value(k, &v)?;
        }
        if let Some((_, v)) = get("QUILL_CLEANUP_MEDIA_ROOT") {
            self.cleanup.media_root = PathBuf::from(v);
        }

        // Invite
        if let Some((_, v)) = get("QUILL_INVITE_FRONTEND_URL") {
            self.invite.frontend_url = v;
        }

        // Auth
        if let Some((_, v)) = get("QUILL_AUTH_SECRET") {
            self.auth.secret = v;
        }
        if let Some((k, v)) = get("QUILL_AUTH_ACCESS_TTL") {
            self.auth.access_ttl = parse_duration(k, &v)?;
        }
        if let Some((k, v)) = get("QUILL_AUTH_REFRESH_TTL") {
            self.auth.refresh_ttl = parse_duration(k, &v)?;
        }

        // Logging
        if let Some((_, v)) = get("QUILL_LOGGING_LEVEL") {
            self.logging.level = v;
        }
        if let Some((k, v)) = get("QUILL_LOGGING_JSON_FORMAT") {
            self.logging.json_format = parse_value(k, &v)?;
        }
        if let Some((k, v)) = get("QUILL_LOGGING_WITH_TARGET") {
            self.logging.with_target = parse_value(k, &v)?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.pool_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "store.pool_size must be greater than 0".to_string(),
            ));
        }

        if self.transfer.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "transfer.max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.cleanup.max_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "cleanup.max_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.cleanup.retention.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "cleanup.retention must be greater than 0".to_string(),
            ));
        }

        if self.cleanup.interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "cleanup.interval must be greater than 0".to_string(),
            ));
        }

        if self.auth.secret.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "auth.secret must not be empty".to_string(),
            ));
        }

        if self.logging.level.parse::<LogLevel>().is_err() {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;

        std::fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }
}

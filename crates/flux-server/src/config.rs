//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Collection and schema storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Event submission limits.
    #[serde(default)]
    pub events: EventsConfig,

    /// Query limits.
    #[serde(default)]
    pub query: QueryConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Which store backs schemas and collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-lifetime state.
    #[default]
    Memory,
    /// SQLite file at `storage.path`.
    Sqlite,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("unknown storage backend `{other}`")),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Path to the SQLite database file. `:memory:` keeps it in process.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Event submission configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Largest batch accepted by one submission.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

/// Query configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Upper bound applied to a client's `max_results`.
    #[serde(default = "default_max_results_cap")]
    pub max_results_cap: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "flux_fanout=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    4567
}

fn default_db_path() -> String {
    "flux.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_max_batch_size() -> usize {
    1_000
}

fn default_max_results_cap() -> usize {
    1_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_results_cap: default_max_results_cap(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A setting parsed but is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `FLUX_HOST` overrides `server.host`
/// - `FLUX_PORT` overrides `server.port`
/// - `FLUX_STORAGE_BACKEND` overrides `storage.backend` (`memory` or `sqlite`)
/// - `FLUX_DB_PATH` overrides `storage.path`
/// - `FLUX_LOG_LEVEL` overrides `logging.level`
/// - `FLUX_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// or if a limit ends up zero after overrides.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => parse_config(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    validate(&config)?;
    Ok(config)
}

/// Parses a TOML document into a [`Config`].
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    let config = toml::from_str(contents)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.events.max_batch_size == 0 {
        return Err(ConfigError::Invalid(
            "events.max_batch_size must be at least 1".to_string(),
        ));
    }
    if config.query.max_results_cap == 0 {
        return Err(ConfigError::Invalid(
            "query.max_results_cap must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("FLUX_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("FLUX_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(backend) = var("FLUX_STORAGE_BACKEND") {
        match backend.parse() {
            Ok(parsed) => config.storage.backend = parsed,
            Err(reason) => tracing::warn!(%reason, "ignoring FLUX_STORAGE_BACKEND"),
        }
    }
    if let Some(db_path) = var("FLUX_DB_PATH") {
        config.storage.path = db_path;
    }
    if let Some(level) = var("FLUX_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("FLUX_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}

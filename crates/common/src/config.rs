//! Application configuration.
//!
//! Configuration is loaded from a JSON file; the path can be overridden with
//! the `MEETING_SERVER_CONFIG` environment variable. Every field has a
//! default so a partial (or missing) section still yields a usable config.
//! Sensitive fields are redacted in `Debug` output.

use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Environment variable that overrides the config file path.
pub const CONFIG_PATH_ENV: &str = "MEETING_SERVER_CONFIG";

/// Default config file path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/app.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Bind endpoint for the RPC surface.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 50051,
        }
    }
}

/// Log sink configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level: trace, debug, info, warn, error.
    pub level: String,
    /// Formatting hint for the sink (kept for operator tooling).
    pub pattern: String,
    /// Emit to stderr.
    pub console: bool,
    /// Optional log file path; parent directory is created on demand.
    pub file: String,
    /// Route the executor's log events through the same sinks.
    pub integrate_thread_pool_logger: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            pattern: String::new(),
            console: true,
            file: String::new(),
            integrate_thread_pool_logger: true,
        }
    }
}

/// Back-pressure policy applied when the executor queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum QueuePolicy {
    Block,
    Discard,
    Overwrite,
}

/// Executor tuning knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThreadPoolConfig {
    pub queue_cap: usize,
    pub core_threads: usize,
    pub max_threads: usize,
    pub load_check_interval_ms: u64,
    pub keep_alive_ms: u64,
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    pub pending_hi: usize,
    pub pending_low: usize,
    pub debounce_hits: usize,
    pub cooldown_ms: u64,
    pub queue_policy: QueuePolicy,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            queue_cap: 1024,
            core_threads: 4,
            max_threads: 8,
            load_check_interval_ms: 100,
            keep_alive_ms: 5000,
            scale_up_threshold: 0.75,
            scale_down_threshold: 0.25,
            pending_hi: 64,
            pending_low: 8,
            debounce_hits: 3,
            cooldown_ms: 500,
            queue_policy: QueuePolicy::Block,
        }
    }
}

/// IP-location database settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GeoIpConfig {
    pub db_path: String,
}

/// Coordination service settings. An empty host list disables discovery.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ZookeeperConfig {
    pub hosts: String,
}

/// Durable store settings.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct MySqlConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub pool_size: usize,
    pub connection_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub enabled: bool,
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3306,
            user: "meeting".to_string(),
            password: String::new(),
            database: "meeting".to_string(),
            pool_size: 8,
            connection_timeout_ms: 3000,
            read_timeout_ms: 3000,
            write_timeout_ms: 3000,
            enabled: false,
        }
    }
}

impl fmt::Debug for MySqlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("pool_size", &self.pool_size)
            .field("connection_timeout_ms", &self.connection_timeout_ms)
            .field("read_timeout_ms", &self.read_timeout_ms)
            .field("write_timeout_ms", &self.write_timeout_ms)
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub mysql: MySqlConfig,
}

/// Cache settings.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub db: i64,
    pub pool_size: usize,
    pub connection_timeout_ms: u64,
    pub socket_timeout_ms: u64,
    pub enabled: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: String::new(),
            db: 0,
            pool_size: 8,
            connection_timeout_ms: 1000,
            socket_timeout_ms: 1000,
            enabled: false,
        }
    }
}

impl fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"[REDACTED]")
            .field("db", &self.db)
            .field("pool_size", &self.pool_size)
            .field("connection_timeout_ms", &self.connection_timeout_ms)
            .field("socket_timeout_ms", &self.socket_timeout_ms)
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub redis: RedisConfig,
}

/// Root application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub thread_pool: ThreadPoolConfig,
    pub geoip: GeoIpConfig,
    pub zookeeper: ZookeeperConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
}

impl AppConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load from `MEETING_SERVER_CONFIG`, or the default path, or defaults
    /// when neither file exists.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        if Path::new(&path).exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}

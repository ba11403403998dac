use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::blockchain::{ScannerConfig, StartBlock};
use crate::error::ConfigError;
use crate::retry::RetryConfig;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_VAR: &str = "OBSERVER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "observer.toml";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub rpc: RpcConfig,
    pub scanner: ScannerSettings,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

/// JSON-RPC node connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub endpoint: String,
    /// Deadline for a single round trip
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerSettings {
    pub poll_interval_ms: u64,
    /// `latest`, `genesis`, or a block height treated as already processed
    pub start_block: String,
    /// Attempts made to resolve `latest` before giving up
    pub start_retry_attempts: u32,
    /// Addresses subscribed at start-up
    pub subscriptions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

impl FromStr for StorageBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "sqlite" => Ok(StorageBackend::Sqlite),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// SQLite database file, used by the `sqlite` backend
    pub database_path: String,
}

/// HTTP command surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// error, warn, info, debug or trace
    pub level: String,
    /// json or pretty
    pub format: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8545".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            start_block: "latest".to_string(),
            start_retry_attempts: 5,
            subscriptions: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            database_path: "./observer.db".to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

fn parse_start_block(raw: &str) -> Option<StartBlock> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("latest") {
        return Some(StartBlock::Latest);
    }
    if raw.eq_ignore_ascii_case("genesis") {
        return Some(StartBlock::Genesis);
    }
    raw.parse().ok().map(StartBlock::Height)
}

impl AppConfig {
    /// Load configuration from file, then apply environment overrides.
    ///
    /// Environment variables take precedence over file values.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the file named by `OBSERVER_CONFIG` (default `observer.toml`).
    ///
    /// A missing file yields the defaults.
    pub fn load_from_file() -> Result<Self, ConfigError> {
        let config_path = env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(config_path: &str) -> Result<Self, ConfigError> {
        if !Path::new(config_path).exists() {
            return Ok(Self::default());
        }

        let content =
            fs::read_to_string(config_path).map_err(|_| ConfigError::FileNotFound(config_path.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parsing(e.to_string()))
    }

    /// Apply `OBSERVER_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(endpoint) = env::var("OBSERVER_RPC_URL") {
            self.rpc.endpoint = endpoint;
        }
        if let Some(timeout) = parse_env("OBSERVER_RPC_TIMEOUT_MS")? {
            self.rpc.timeout_ms = timeout;
        }

        if let Some(interval) = parse_env("OBSERVER_POLL_INTERVAL_MS")? {
            self.scanner.poll_interval_ms = interval;
        }
        if let Ok(start_block) = env::var("OBSERVER_START_BLOCK") {
            self.scanner.start_block = start_block;
        }
        if let Ok(subscriptions) = env::var("OBSERVER_SUBSCRIPTIONS") {
            self.scanner.subscriptions = subscriptions
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(backend) = parse_env("OBSERVER_STORAGE_BACKEND")? {
            self.storage.backend = backend;
        }
        if let Ok(path) = env::var("OBSERVER_DATABASE_PATH") {
            self.storage.database_path = path;
        }

        if let Some(port) = parse_env("OBSERVER_API_PORT")? {
            self.api.port = port;
        }
        if let Ok(host) = env::var("OBSERVER_API_HOST") {
            self.api.host = host;
        }

        if let Ok(level) = env::var("OBSERVER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = env::var("OBSERVER_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.rpc.endpoint.starts_with("http://") && !self.rpc.endpoint.starts_with("https://") {
            return Err(ConfigError::InvalidUrl(self.rpc.endpoint.clone()));
        }

        if self.rpc.timeout_ms == 0 || self.rpc.timeout_ms > 300_000 {
            return Err(ConfigError::InvalidValue {
                key: "rpc.timeout_ms".to_string(),
                value: self.rpc.timeout_ms.to_string(),
            });
        }

        if self.scanner.poll_interval_ms == 0 || self.scanner.poll_interval_ms > 300_000 {
            return Err(ConfigError::InvalidValue {
                key: "scanner.poll_interval_ms".to_string(),
                value: self.scanner.poll_interval_ms.to_string(),
            });
        }

        self.start_block()?;

        if self.scanner.start_retry_attempts == 0 || self.scanner.start_retry_attempts > 20 {
            return Err(ConfigError::InvalidValue {
                key: "scanner.start_retry_attempts".to_string(),
                value: self.scanner.start_retry_attempts.to_string(),
            });
        }

        if self.storage.backend == StorageBackend::Sqlite && self.storage.database_path.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "storage.database_path".to_string(),
                value: self.storage.database_path.clone(),
            });
        }

        if self.api.enabled && self.api.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "api.port".to_string(),
                value: self.api.port.to_string(),
            });
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                value: self.logging.level.clone(),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.format".to_string(),
                value: self.logging.format.clone(),
            });
        }

        Ok(())
    }

    pub fn start_block(&self) -> Result<StartBlock, ConfigError> {
        parse_start_block(&self.scanner.start_block).ok_or_else(|| ConfigError::InvalidValue {
            key: "scanner.start_block".to_string(),
            value: self.scanner.start_block.clone(),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc.timeout_ms)
    }

    pub fn scanner_config(&self) -> Result<ScannerConfig, ConfigError> {
        Ok(ScannerConfig {
            poll_interval: Duration::from_millis(self.scanner.poll_interval_ms),
            request_timeout: self.request_timeout(),
            start_block: self.start_block()?,
            start_retry: RetryConfig {
                max_attempts: self.scanner.start_retry_attempts,
                ..RetryConfig::for_rpc()
            },
        })
    }

    /// Generate a sample configuration file
    pub fn generate_sample_config() -> Result<String, ConfigError> {
        toml::to_string_pretty(&Self::default()).map_err(|e| ConfigError::Parsing(e.to_string()))
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parsing(e.to_string()))?;
        fs::write(path, content).map_err(|_| ConfigError::FileNotFound(path.to_string()))?;
        Ok(())
    }
}

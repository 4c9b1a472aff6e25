//! Configuration management for USGS Explorer
//!
//! Settings come from a TOML file found in this order: an explicit
//! `--config` path, `./usgs-explorer.toml`, then
//! `<user config dir>/usgs-explorer/config.toml`. Every key is optional;
//! missing keys keep their defaults. Command-line flags are applied on top by
//! the CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::download::{DownloadConfig, ProgressMode};
use crate::app::retry::RetryPolicy;
use crate::app::ClientConfig;
use crate::constants::{download, files, http, limits, m2m};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Catalog client settings
    pub client: ClientConfigToml,
    /// Download batch settings
    pub download: DownloadConfigToml,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfigToml {
    /// JSON API root
    pub base_url: String,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Rate limit (requests per second)
    pub rate_limit_rps: u32,
    /// Retries of a failed catalog call
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub retry_base_delay_ms: u64,
    /// Maximum retry delay in milliseconds
    pub max_backoff_ms: u64,
    /// Maximum connections per host
    pub pool_max_per_host: usize,
    /// Seconds between polls for products still being prepared
    pub retrieve_poll_interval_secs: u64,
    /// Polls before preparing products are given up on
    pub retrieve_max_polls: u32,
}

impl Default for ClientConfigToml {
    fn default() -> Self {
        Self {
            base_url: m2m::BASE_URL.to_string(),
            request_timeout_secs: http::DEFAULT_TIMEOUT.as_secs(),
            connect_timeout_secs: http::CONNECT_TIMEOUT.as_secs(),
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            max_retries: limits::MAX_RETRIES,
            retry_base_delay_ms: limits::RETRY_BASE_DELAY_MS,
            max_backoff_ms: limits::MAX_BACKOFF_MS,
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            retrieve_poll_interval_secs: download::RETRIEVE_POLL_INTERVAL.as_secs(),
            retrieve_max_polls: download::RETRIEVE_MAX_POLLS,
        }
    }
}

/// TOML-friendly download configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfigToml {
    /// Number of concurrent transfer workers
    pub max_thread: usize,
    /// Attempts per file
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds
    pub retry_base_delay_ms: u64,
    /// Maximum delay between attempts in seconds
    pub retry_max_delay_secs: u64,
    /// Replace files already downloaded
    pub overwrite: bool,
    /// silent | aggregate | per-task
    pub progress: ProgressMode,
    /// Ids per URL resolution request
    pub url_batch_size: usize,
}

impl Default for DownloadConfigToml {
    fn default() -> Self {
        Self {
            max_thread: download::DEFAULT_MAX_THREAD,
            max_attempts: download::DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: download::RETRY_BASE_DELAY.as_millis() as u64,
            retry_max_delay_secs: download::RETRY_MAX_DELAY.as_secs(),
            overwrite: false,
            progress: ProgressMode::default(),
            url_batch_size: download::URL_BATCH_SIZE,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// error, warn, info, debug or trace
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl AppConfig {
    /// Load the first configuration file found, or defaults if there is none
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if an explicit path does not exist and
    /// `ConfigError::InvalidFormat` if the file is not valid TOML for this schema
    pub async fn load(config_file_override: Option<&Path>) -> ConfigResult<Self> {
        let config_path = match config_file_override {
            Some(path) if !path.exists() => {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            Some(path) => Some(path.to_path_buf()),
            None => Self::find_config_file(),
        };

        let config = match config_path {
            Some(path) => Self::load_from_file(&path).await?,
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Standard locations, most specific first
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(files::LOCAL_CONFIG_FILE)];
        if let Some(path) = Self::default_config_path() {
            paths.push(path);
        }
        paths
    }

    /// `<user config dir>/usgs-explorer/config.toml`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(files::CONFIG_DIR_NAME).join("config.toml"))
    }

    fn find_config_file() -> Option<PathBuf> {
        Self::search_paths().into_iter().find(|path| {
            let found = path.exists();
            if found {
                debug!("Found config file: {}", path.display());
            }
            found
        })
    }

    async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::from_toml(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.client.rate_limit_rps == 0 {
            return Err(invalid(
                "client.rate_limit_rps",
                "0",
                "Rate limit must be at least one request per second",
            ));
        }
        if self.client.base_url.trim().is_empty() {
            return Err(invalid("client.base_url", "", "Base URL cannot be empty"));
        }
        if self.download.max_thread == 0 || self.download.max_thread > download::MAX_THREAD_LIMIT {
            return Err(invalid(
                "download.max_thread",
                &self.download.max_thread.to_string(),
                &format!("Must be between 1 and {}", download::MAX_THREAD_LIMIT),
            ));
        }
        if self.download.max_attempts == 0 {
            return Err(invalid(
                "download.max_attempts",
                "0",
                "At least one attempt is required",
            ));
        }
        if !matches!(
            self.logging.level.to_lowercase().as_str(),
            "error" | "warn" | "info" | "debug" | "trace"
        ) {
            return Err(invalid(
                "logging.level",
                &self.logging.level,
                "Expected one of error, warn, info, debug, trace",
            ));
        }
        Ok(())
    }

    /// Convert TOML-friendly configuration to runtime configuration
    pub fn to_runtime_config(&self) -> (ClientConfig, DownloadConfig) {
        (
            self.client.to_runtime_config(),
            self.download.to_runtime_config(),
        )
    }
}

impl ClientConfigToml {
    pub fn to_runtime_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            pool_max_per_host: self.pool_max_per_host,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            rate_limit_rps: self.rate_limit_rps,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
                max_delay: Duration::from_millis(self.max_backoff_ms),
                jitter: limits::BACKOFF_JITTER_FACTOR,
            },
            retrieve_poll_interval: Duration::from_secs(self.retrieve_poll_interval_secs),
            retrieve_max_polls: self.retrieve_max_polls,
            ..ClientConfig::default()
        }
    }
}

impl DownloadConfigToml {
    pub fn to_runtime_config(&self) -> DownloadConfig {
        DownloadConfig {
            max_thread: self.max_thread,
            max_attempts: self.max_attempts,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            retry_max_delay: Duration::from_secs(self.retry_max_delay_secs),
            overwrite: self.overwrite,
            progress: self.progress,
            url_batch_size: self.url_batch_size,
        }
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

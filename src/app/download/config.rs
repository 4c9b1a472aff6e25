//! Download batch configuration
//!
//! Mirrors the `[download]` section of the configuration file. Values are
//! validated once when the manager is built, never per task.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::progress::ProgressMode;
use crate::app::retry::RetryPolicy;
use crate::constants::{download, limits};
use crate::errors::{DownloadError, DownloadResult};

/// Configuration for a download batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Number of concurrent transfer workers
    pub max_thread: usize,
    /// Transfer attempts per file, the first one included
    pub max_attempts: u32,
    /// Base delay between attempts (exponential backoff)
    pub retry_base_delay: Duration,
    /// Backoff cap
    pub retry_max_delay: Duration,
    /// Download again even if a finished file for the entity exists
    pub overwrite: bool,
    pub progress: ProgressMode,
    /// Ids per URL resolution round trip
    pub url_batch_size: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_thread: download::DEFAULT_MAX_THREAD,
            max_attempts: download::DEFAULT_MAX_ATTEMPTS,
            retry_base_delay: download::RETRY_BASE_DELAY,
            retry_max_delay: download::RETRY_MAX_DELAY,
            overwrite: false,
            progress: ProgressMode::default(),
            url_batch_size: download::URL_BATCH_SIZE,
        }
    }
}

impl DownloadConfig {
    /// Validate configuration values and return errors for invalid settings
    pub fn validate(&self) -> DownloadResult<()> {
        if self.max_thread == 0 {
            return Err(DownloadError::ConfigurationError(
                "max_thread cannot be zero".to_string(),
            ));
        }

        if self.max_thread > download::MAX_THREAD_LIMIT {
            return Err(DownloadError::ConfigurationError(format!(
                "max_thread ({}) exceeds maximum ({})",
                self.max_thread,
                download::MAX_THREAD_LIMIT
            )));
        }

        if self.max_attempts == 0 {
            return Err(DownloadError::ConfigurationError(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        if self.retry_base_delay > self.retry_max_delay {
            return Err(DownloadError::ConfigurationError(
                "Retry base delay cannot exceed max delay".to_string(),
            ));
        }

        if self.url_batch_size == 0 {
            return Err(DownloadError::ConfigurationError(
                "url_batch_size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Backoff curve between transfer attempts
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_attempts.saturating_sub(1),
            base_delay: self.retry_base_delay,
            max_delay: self.retry_max_delay,
            jitter: limits::BACKOFF_JITTER_FACTOR,
        }
    }
}

/// Builder for DownloadConfig
#[derive(Debug, Default)]
pub struct DownloadConfigBuilder {
    config: DownloadConfig,
}

impl DownloadConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: DownloadConfig::default(),
        }
    }

    pub fn max_thread(mut self, count: usize) -> Self {
        self.config.max_thread = count;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.config.retry_base_delay = delay;
        self
    }

    pub fn retry_max_delay(mut self, delay: Duration) -> Self {
        self.config.retry_max_delay = delay;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.config.overwrite = overwrite;
        self
    }

    pub fn progress(mut self, mode: ProgressMode) -> Self {
        self.config.progress = mode;
        self
    }

    pub fn url_batch_size(mut self, size: usize) -> Self {
        self.config.url_batch_size = size;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> DownloadResult<DownloadConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

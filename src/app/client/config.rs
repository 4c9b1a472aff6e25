//! HTTP client configuration and building logic
//!
//! This module handles the configuration and construction of the HTTP client
//! used for M2M catalog calls.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::app::retry::RetryPolicy;
use crate::constants::{download, http, limits, m2m};
use crate::errors::{NetworkError, NetworkResult};

/// Configuration for the catalog HTTP client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Root of the JSON API, endpoints are joined onto it
    pub base_url: String,
    /// TCP keep-alive settings
    pub tcp_keepalive: Option<Duration>,
    /// Connection pool idle timeout
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum number of connections per host
    pub pool_max_per_host: usize,
    /// Request timeout
    pub request_timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Rate limit (requests per second)
    pub rate_limit_rps: u32,
    /// Backoff for retryable failures
    pub retry: RetryPolicy,
    /// Wait between `download-retrieve` polls for products still being prepared
    pub retrieve_poll_interval: Duration,
    /// Polls before the remaining products are reported unavailable
    pub retrieve_max_polls: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: m2m::BASE_URL.to_string(),
            tcp_keepalive: Some(Duration::from_secs(30)),
            pool_idle_timeout: Some(http::POOL_IDLE_TIMEOUT),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            retry: RetryPolicy::default(),
            retrieve_poll_interval: download::RETRIEVE_POLL_INTERVAL,
            retrieve_max_polls: download::RETRIEVE_MAX_POLLS,
        }
    }
}

impl ClientConfig {
    /// Builds the HTTP client with the specified configuration
    pub fn build_http_client(&self) -> NetworkResult<Client> {
        let mut client_builder = Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(http::USER_AGENT)
            .pool_max_idle_per_host(self.pool_max_per_host);

        if let Some(keepalive) = self.tcp_keepalive {
            client_builder = client_builder.tcp_keepalive(keepalive);
        }

        if let Some(idle_timeout) = self.pool_idle_timeout {
            client_builder = client_builder.pool_idle_timeout(idle_timeout);
        }

        client_builder.build().map_err(NetworkError::Http)
    }

    /// Parsed API root, always ending in `/` so endpoint joins append
    pub fn base_url(&self) -> NetworkResult<Url> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).map_err(|e| NetworkError::InvalidUrl {
            url: self.base_url.clone(),
            error: e.to_string(),
        })
    }
}

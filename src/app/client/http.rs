//! JSON transport for the M2M API with rate limiting
//!
//! Every catalog call is a POST of a JSON payload to `<base>/<endpoint>` that
//! answers with the `{data, errorCode, errorMessage}` envelope. The `Transport`
//! trait is the seam between the session logic and the wire, so tests can
//! swap in canned envelopes.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::config::ClientConfig;
use crate::constants::m2m;
use crate::errors::{NetworkError, NetworkResult};

/// Response envelope shared by all M2M endpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope {
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ApiEnvelope {
    /// Successful envelope carrying `data`
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            error_code: None,
            error_message: None,
        }
    }

    /// Envelope reporting a service error code
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            data: Value::Null,
            error_code: Some(code.into()),
            error_message: Some(message.into()),
        }
    }
}

/// Sends one JSON call and returns the decoded envelope
///
/// Implementations perform exactly one attempt; retry policy lives in the session.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(
        &self,
        endpoint: &str,
        payload: &Value,
        auth_key: Option<&str>,
    ) -> NetworkResult<ApiEnvelope>;
}

/// Production transport using reqwest and a direct governor rate limiter
#[derive(Debug)]
pub struct ReqwestTransport {
    client: Client,
    base_url: Url,
    rate_limiter: RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>,
}

impl ReqwestTransport {
    /// Creates the transport from client configuration
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` if the base URL is invalid, the rate limit is zero
    /// or the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> NetworkResult<Self> {
        Ok(Self {
            client: config.build_http_client()?,
            base_url: config.base_url()?,
            rate_limiter: Self::build_rate_limiter(config.rate_limit_rps)?,
        })
    }

    fn build_rate_limiter(
        rate_limit_rps: u32,
    ) -> NetworkResult<RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>> {
        let quota = Quota::per_second(NonZeroU32::new(rate_limit_rps).ok_or_else(|| {
            NetworkError::RateLimiter {
                reason: "Rate limit must be non-zero".to_string(),
            }
        })?);
        Ok(RateLimiter::direct(quota))
    }

    fn endpoint_url(&self, endpoint: &str) -> NetworkResult<Url> {
        self.base_url
            .join(endpoint)
            .map_err(|e| NetworkError::InvalidUrl {
                url: format!("{}{}", self.base_url, endpoint),
                error: e.to_string(),
            })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_json(
        &self,
        endpoint: &str,
        payload: &Value,
        auth_key: Option<&str>,
    ) -> NetworkResult<ApiEnvelope> {
        let url = self.endpoint_url(endpoint)?;

        // Jitter keeps concurrent callers from waking in lockstep
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
            .await;

        let mut request = self.client.post(url.as_str()).json(payload);
        if let Some(key) = auth_key {
            request = request.header(m2m::AUTH_HEADER, key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                NetworkError::Timeout {
                    endpoint: endpoint.to_string(),
                }
            } else {
                NetworkError::Http(e)
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(NetworkError::RateLimited {
                message: format!("HTTP 429 from {}", endpoint),
            });
        }
        if status.is_server_error() {
            return Err(NetworkError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        tracing::debug!("{} -> HTTP {} ({} bytes)", endpoint, status, body.len());

        // 4xx answers usually still carry an envelope with the real error code
        match serde_json::from_str::<ApiEnvelope>(&body) {
            Ok(envelope) => Ok(envelope),
            Err(_) if !status.is_success() => Err(NetworkError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }),
            Err(e) => Err(NetworkError::MalformedResponse {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

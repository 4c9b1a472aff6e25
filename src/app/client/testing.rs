//! Scripted transport for unit tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::http::{ApiEnvelope, Transport};
use crate::errors::{NetworkError, NetworkResult};

type Handler = Box<dyn Fn(&Value, Option<&str>) -> NetworkResult<ApiEnvelope> + Send + Sync>;

/// One call seen by the fake
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub endpoint: String,
    pub payload: Value,
    pub auth_key: Option<String>,
}

/// Transport answering each endpoint with a closure
#[derive(Default)]
pub struct FakeTransport {
    handlers: HashMap<String, Handler>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `endpoint` with the given closure
    pub fn with_handler<F>(mut self, endpoint: &str, handler: F) -> Self
    where
        F: Fn(&Value, Option<&str>) -> NetworkResult<ApiEnvelope> + Send + Sync + 'static,
    {
        self.handlers.insert(endpoint.to_string(), Box::new(handler));
        self
    }

    /// Answer `endpoint` with fixed data
    pub fn with_data(self, endpoint: &str, data: Value) -> Self {
        self.with_handler(endpoint, move |_, _| Ok(ApiEnvelope::ok(data.clone())))
    }

    /// Accept both login endpoints with a fixed key and acknowledge logout
    pub fn with_login(self, key: &str) -> Self {
        let key = key.to_string();
        let token_key = key.clone();
        self.with_handler("login", move |_, _| Ok(ApiEnvelope::ok(json!(key))))
            .with_handler("login-token", move |_, _| {
                Ok(ApiEnvelope::ok(json!(token_key)))
            })
            .with_data("logout", Value::Null)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_to(&self, endpoint: &str) -> usize {
        self.calls().iter().filter(|c| c.endpoint == endpoint).count()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn post_json(
        &self,
        endpoint: &str,
        payload: &Value,
        auth_key: Option<&str>,
    ) -> NetworkResult<ApiEnvelope> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                endpoint: endpoint.to_string(),
                payload: payload.clone(),
                auth_key: auth_key.map(str::to_string),
            });
        }

        // Let other tasks interleave like a real network call would
        tokio::task::yield_now().await;

        match self.handlers.get(endpoint) {
            Some(handler) => handler(payload, auth_key),
            None => Err(NetworkError::Service {
                code: "UNKNOWN_ENDPOINT".to_string(),
                message: format!("no fake handler for {}", endpoint),
            }),
        }
    }
}

//! Authenticated M2M session
//!
//! The session owns the service-issued key. Every catalog call goes through
//! [`Session::authorized_request`], which signs the call, retries transient
//! failures with backoff and re-authenticates once when the key is rejected.
//! Re-logins are serialized under a mutex and checked against a generation
//! counter so a burst of concurrent rejections triggers a single login.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::http::{ApiEnvelope, Transport};
use crate::app::retry::RetryPolicy;
use crate::auth::Credentials;
use crate::constants::m2m::{self, endpoints};
use crate::errors::{AuthError, AuthResult, CatalogError, CatalogResult, NetworkError};

#[derive(Debug, Clone)]
struct SessionKey {
    value: String,
    generation: u64,
}

/// One authenticated connection to the service
pub struct Session {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    retry: RetryPolicy,
    key: RwLock<Option<SessionKey>>,
    relogin: Mutex<()>,
    generation: AtomicU64,
    logged_out: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("credentials", &self.credentials)
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .field("logged_out", &self.logged_out.load(Ordering::SeqCst))
            .finish()
    }
}

impl Session {
    /// Create a session; no call is made until the first request or `login`
    pub fn new(transport: Arc<dyn Transport>, credentials: Credentials, retry: RetryPolicy) -> Self {
        Self {
            transport,
            credentials,
            retry,
            key: RwLock::new(None),
            relogin: Mutex::new(()),
            generation: AtomicU64::new(0),
            logged_out: AtomicBool::new(false),
        }
    }

    /// Log in with the stored credentials and return the new session key
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Rejected` if the service refuses the credentials and
    /// `AuthError::LoggedOut` once `logout` has run.
    pub async fn login(&self) -> AuthResult<String> {
        self.ensure_open()?;
        let _guard = self.relogin.lock().await;
        Ok(self.login_locked().await?.value)
    }

    /// Number of successful logins so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub async fn is_authenticated(&self) -> bool {
        self.key.read().await.is_some()
    }

    pub fn is_logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }

    /// Signed call to `endpoint`, returning the envelope's `data`
    ///
    /// Logs in on first use. A rejected key triggers one re-login and one
    /// retry; a second rejection surfaces as `AuthError::SessionExpired`.
    pub async fn authorized_request(&self, endpoint: &str, payload: &Value) -> CatalogResult<Value> {
        let key = self.current_key().await?;

        match self.call_with_retry(endpoint, payload, Some(&key.value)).await {
            Err(CatalogError::Auth(AuthError::Rejected { code, .. })) => {
                warn!("Session key rejected by {} ({}), re-authenticating", endpoint, code);
                let fresh = self.refresh_key(key.generation).await?;
                match self.call_with_retry(endpoint, payload, Some(&fresh.value)).await {
                    Err(CatalogError::Auth(AuthError::Rejected { .. })) => {
                        Err(AuthError::SessionExpired.into())
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Invalidate the session; only the first call contacts the service
    pub async fn logout(&self) -> AuthResult<()> {
        if self.logged_out.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let key = self.key.write().await.take();
        if let Some(key) = key {
            match self
                .transport
                .post_json(endpoints::LOGOUT, &json!({}), Some(&key.value))
                .await
            {
                Ok(_) => info!("Logged out of M2M"),
                // The key expires server-side anyway
                Err(e) => warn!("Logout call failed: {}", e),
            }
        }
        Ok(())
    }

    fn ensure_open(&self) -> AuthResult<()> {
        if self.is_logged_out() {
            Err(AuthError::LoggedOut)
        } else {
            Ok(())
        }
    }

    async fn current_key(&self) -> AuthResult<SessionKey> {
        self.ensure_open()?;
        if let Some(key) = self.key.read().await.clone() {
            return Ok(key);
        }

        let _guard = self.relogin.lock().await;
        // Another caller may have logged in while we waited
        if let Some(key) = self.key.read().await.clone() {
            return Ok(key);
        }
        self.login_locked().await
    }

    async fn refresh_key(&self, stale_generation: u64) -> AuthResult<SessionKey> {
        self.ensure_open()?;
        let _guard = self.relogin.lock().await;
        if let Some(key) = self.key.read().await.clone() {
            if key.generation != stale_generation {
                debug!("Reusing key from concurrent re-login (generation {})", key.generation);
                return Ok(key);
            }
        }
        self.login_locked().await
    }

    /// Caller must hold `relogin`
    async fn login_locked(&self) -> AuthResult<SessionKey> {
        let (endpoint, payload) = self.credentials.login_request();
        info!(
            "Logging in to M2M as {} using {}",
            self.credentials.username(),
            self.credentials.secret().kind()
        );

        let data = self
            .call_with_retry(endpoint, &payload, None)
            .await
            .map_err(into_auth_error)?;
        let value = data
            .as_str()
            .filter(|k| !k.is_empty())
            .ok_or(AuthError::MissingSessionKey)?
            .to_string();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let key = SessionKey { value, generation };
        *self.key.write().await = Some(key.clone());
        debug!("Session key generation {} installed", generation);
        Ok(key)
    }

    async fn call_with_retry(
        &self,
        endpoint: &str,
        payload: &Value,
        auth_key: Option<&str>,
    ) -> CatalogResult<Value> {
        let mut retries = 0;
        loop {
            let outcome = match self.transport.post_json(endpoint, payload, auth_key).await {
                Ok(envelope) => classify(envelope),
                Err(e) => Err(CatalogError::Network(e)),
            };

            match outcome {
                Err(CatalogError::Network(e)) if e.is_retryable() && self.retry.allows(retries) => {
                    retries += 1;
                    let delay = self.retry.delay_for(retries);
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {}ms",
                        endpoint,
                        retries,
                        self.retry.max_retries,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

/// Map an envelope's error code onto the error taxonomy
fn classify(envelope: ApiEnvelope) -> CatalogResult<Value> {
    let code = match envelope.error_code {
        Some(code) if !code.is_empty() => code,
        _ => return Ok(envelope.data),
    };
    let message = envelope.error_message.unwrap_or_default();

    if m2m::AUTH_ERROR_CODES.contains(&code.as_str()) {
        Err(AuthError::Rejected { code, message }.into())
    } else if code == m2m::RATE_LIMIT_CODE {
        Err(NetworkError::RateLimited { message }.into())
    } else {
        Err(NetworkError::Service { code, message }.into())
    }
}

fn into_auth_error(err: CatalogError) -> AuthError {
    match err {
        CatalogError::Auth(e) => e,
        CatalogError::Network(e) => AuthError::Network(e),
        CatalogError::UnknownDataset { name, .. } => AuthError::Rejected {
            code: m2m::DATASET_INVALID_CODE.to_string(),
            message: name,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::client::testing::FakeTransport;
    use std::sync::atomic::AtomicUsize;

    fn session(transport: FakeTransport) -> (Arc<FakeTransport>, Arc<Session>) {
        let transport = Arc::new(transport);
        let credentials = Credentials::with_token("user", "tok").unwrap();
        let session = Arc::new(Session::new(
            transport.clone(),
            credentials,
            RetryPolicy::immediate(2),
        ));
        (transport, session)
    }

    #[tokio::test]
    async fn test_login_and_signed_request() {
        let (transport, session) = session(
            FakeTransport::new()
                .with_login("key-1")
                .with_data("dataset-search", json!([])),
        );

        let data = session
            .authorized_request("dataset-search", &json!({}))
            .await
            .unwrap();
        assert_eq!(data, json!([]));
        assert_eq!(transport.calls_to("login-token"), 1);

        let calls = transport.calls();
        assert_eq!(calls[0].auth_key, None);
        assert_eq!(calls[1].auth_key.as_deref(), Some("key-1"));
        assert_eq!(session.generation(), 1);
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let (_, session) = session(FakeTransport::new().with_handler("login-token", |_, _| {
            Ok(ApiEnvelope::error("AUTH_INVALID", "User credential verification failed"))
        }));

        let err = session.login().await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected { code, .. } if code == "AUTH_INVALID"));
    }

    #[tokio::test]
    async fn test_reauthenticates_once_then_gives_up() {
        let logins = Arc::new(AtomicUsize::new(0));
        let counter = logins.clone();
        let (transport, session) = session(
            FakeTransport::new()
                .with_handler("login-token", move |_, _| {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok(ApiEnvelope::ok(json!(format!("key-{}", n))))
                })
                .with_handler("scene-search", |_, _| {
                    Ok(ApiEnvelope::error("AUTH_KEY_INVALID", "expired"))
                }),
        );

        let err = session
            .authorized_request("scene-search", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Auth(AuthError::SessionExpired)));
        assert_eq!(logins.load(Ordering::SeqCst), 2);
        assert_eq!(transport.calls_to("scene-search"), 2);
    }

    #[tokio::test]
    async fn test_concurrent_rejections_trigger_single_relogin() {
        let logins = Arc::new(AtomicUsize::new(0));
        let counter = logins.clone();
        let (_, session) = session(
            FakeTransport::new()
                .with_handler("login-token", move |_, _| {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok(ApiEnvelope::ok(json!(format!("key-{}", n))))
                })
                .with_handler("dataset-filters", |_, key| match key {
                    Some("key-1") => Ok(ApiEnvelope::error("AUTH_UNAUTHROIZED", "stale")),
                    _ => Ok(ApiEnvelope::ok(json!([]))),
                }),
        );

        let mut handles = Vec::new();
        for _ in 0..8 {
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                session
                    .authorized_request("dataset-filters", &json!({}))
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(logins.load(Ordering::SeqCst), 2);
        assert_eq!(session.generation(), 2);
    }

    #[tokio::test]
    async fn test_retryable_errors_are_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let (_, session) = session(FakeTransport::new().with_login("k").with_handler(
            "scene-search",
            move |_, _| {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Ok(ApiEnvelope::error("RATE_LIMIT", "slow down"))
                } else {
                    Ok(ApiEnvelope::ok(json!({"results": []})))
                }
            },
        ));

        let result = session.authorized_request("scene-search", &json!({})).await;
        tokio_test::assert_ok!(result);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let (transport, session) = session(FakeTransport::new().with_login("k").with_handler(
            "scene-search",
            |_, _| {
                Err(NetworkError::Status {
                    status: 502,
                    url: "fake".to_string(),
                })
            },
        ));

        let err = session
            .authorized_request("scene-search", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Network(NetworkError::Status { status: 502, .. })));
        // first attempt plus two retries
        assert_eq!(transport.calls_to("scene-search"), 3);
    }

    #[tokio::test]
    async fn test_service_errors_are_not_retried() {
        let (transport, session) = session(FakeTransport::new().with_login("k").with_handler(
            "scene-search",
            |_, _| Ok(ApiEnvelope::error("INPUT_INVALID", "bad filter")),
        ));

        let err = session
            .authorized_request("scene-search", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Network(NetworkError::Service { .. })));
        assert_eq!(transport.calls_to("scene-search"), 1);
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let (transport, session) = session(
            FakeTransport::new()
                .with_login("k")
                .with_data("dataset-search", json!([])),
        );
        session
            .authorized_request("dataset-search", &json!({}))
            .await
            .unwrap();

        session.logout().await.unwrap();
        session.logout().await.unwrap();
        assert_eq!(transport.calls_to("logout"), 1);
        assert!(!session.is_authenticated().await);

        let err = session
            .authorized_request("dataset-search", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Auth(AuthError::LoggedOut)));
    }

    #[tokio::test]
    async fn test_logout_without_login_makes_no_call() {
        let (transport, session) = session(FakeTransport::new().with_login("k"));
        session.logout().await.unwrap();
        assert!(transport.calls().is_empty());
    }
}

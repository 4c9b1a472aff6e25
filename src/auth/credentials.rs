//! EarthExplorer credential handling
//!
//! Credentials are a username plus either a password or an application token.
//! Tokens take precedence because the service is phasing out password logins.

use std::env;
use std::fmt;

use serde_json::{json, Value};

use crate::constants::{env as env_constants, m2m::endpoints};
use crate::errors::{AuthError, AuthResult};

/// Secret half of the credentials
#[derive(Clone, PartialEq, Eq)]
pub enum Secret {
    Password(String),
    Token(String),
}

impl Secret {
    /// Label used in log lines, never the secret itself
    pub fn kind(&self) -> &'static str {
        match self {
            Secret::Password(_) => "password",
            Secret::Token(_) => "token",
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret::{}(***)", self.kind())
    }
}

/// Identity used to obtain a session key
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    secret: Secret,
}

impl Credentials {
    /// Build credentials from a username and whichever secrets are available
    ///
    /// A token wins when both are supplied.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingCredentials` if neither secret is given and
    /// `AuthError::InvalidUsername` for a malformed username.
    pub fn new(
        username: impl Into<String>,
        password: Option<String>,
        token: Option<String>,
    ) -> AuthResult<Self> {
        let username = username.into().trim().to_string();
        if !is_valid_username(&username) {
            return Err(AuthError::InvalidUsername {
                reason: "Username must be non-empty and contain no whitespace".to_string(),
            });
        }

        let secret = match (non_empty(token), non_empty(password)) {
            (Some(token), _) => Secret::Token(token),
            (None, Some(password)) => Secret::Password(password),
            (None, None) => return Err(AuthError::MissingCredentials),
        };

        Ok(Self { username, secret })
    }

    /// Shorthand for password credentials
    pub fn with_password(username: impl Into<String>, password: impl Into<String>) -> AuthResult<Self> {
        Self::new(username, Some(password.into()), None)
    }

    /// Shorthand for token credentials
    pub fn with_token(username: impl Into<String>, token: impl Into<String>) -> AuthResult<Self> {
        Self::new(username, None, Some(token.into()))
    }

    /// Read credentials from `USGS_USERNAME` and `USGS_TOKEN` / `USGS_PASSWORD`
    pub fn from_env() -> AuthResult<Self> {
        let username = env::var(env_constants::USERNAME).map_err(|_| AuthError::MissingCredentials)?;
        Self::new(
            username,
            env::var(env_constants::PASSWORD).ok(),
            env::var(env_constants::TOKEN).ok(),
        )
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    /// Endpoint and payload of the login call for these credentials
    pub fn login_request(&self) -> (&'static str, Value) {
        match &self.secret {
            Secret::Token(token) => (
                endpoints::LOGIN_TOKEN,
                json!({ "username": self.username, "token": token }),
            ),
            Secret::Password(password) => (
                endpoints::LOGIN,
                json!({ "username": self.username, "password": password }),
            ),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &self.secret)
            .finish()
    }
}

/// Which credential variables are present in the environment
#[derive(Debug, Clone)]
pub struct AuthStatus {
    pub username_set: bool,
    pub password_set: bool,
    pub token_set: bool,
}

impl AuthStatus {
    /// Check if a username and at least one secret are available
    pub fn has_credentials(&self) -> bool {
        self.username_set && (self.password_set || self.token_set)
    }

    /// Get descriptive status message for display
    pub fn status_message(&self) -> String {
        match (self.username_set, self.token_set, self.password_set) {
            (false, _, _) => format!("Missing credentials - set {}", env_constants::USERNAME),
            (true, true, _) => "Token credentials configured".to_string(),
            (true, false, true) => "Password credentials configured".to_string(),
            (true, false, false) => format!(
                "Missing credentials - set {} or {}",
                env_constants::TOKEN,
                env_constants::PASSWORD
            ),
        }
    }
}

/// Check current authentication status
pub fn get_auth_status() -> AuthStatus {
    AuthStatus {
        username_set: env::var(env_constants::USERNAME).is_ok(),
        password_set: env::var(env_constants::PASSWORD).is_ok(),
        token_set: env::var(env_constants::TOKEN).is_ok(),
    }
}

fn is_valid_username(username: &str) -> bool {
    !username.is_empty() && !username.chars().any(char::is_whitespace)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_preferred_over_password() {
        let creds = Credentials::new(
            "user",
            Some("pass".to_string()),
            Some("tok".to_string()),
        )
        .unwrap();
        assert_eq!(creds.secret(), &Secret::Token("tok".to_string()));

        let (endpoint, payload) = creds.login_request();
        assert_eq!(endpoint, "login-token");
        assert_eq!(payload["token"], "tok");
        assert!(payload.get("password").is_none());
    }

    #[test]
    fn test_password_login_request() {
        let creds = Credentials::with_password("user", "pass").unwrap();
        let (endpoint, payload) = creds.login_request();
        assert_eq!(endpoint, "login");
        assert_eq!(payload["username"], "user");
        assert_eq!(payload["password"], "pass");
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        let result = Credentials::new("user", None, Some("  ".to_string()));
        assert!(matches!(result, Err(AuthError::MissingCredentials)));
    }

    #[test]
    fn test_invalid_username() {
        assert!(matches!(
            Credentials::with_token("", "tok"),
            Err(AuthError::InvalidUsername { .. })
        ));
        assert!(matches!(
            Credentials::with_token("two words", "tok"),
            Err(AuthError::InvalidUsername { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = Credentials::with_password("user", "hunter2").unwrap();
        let printed = format!("{:?}", creds);
        assert!(printed.contains("user"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_auth_status_messages() {
        let mut status = AuthStatus {
            username_set: false,
            password_set: false,
            token_set: false,
        };
        assert!(status.status_message().contains("Missing credentials"));
        assert!(!status.has_credentials());

        status.username_set = true;
        assert!(status.status_message().contains("USGS_TOKEN"));

        status.password_set = true;
        assert!(status.has_credentials());
        assert!(status.status_message().contains("Password"));

        status.token_set = true;
        assert!(status.status_message().contains("Token"));
    }
}

//! Error types for USGS Explorer
//!
//! This module defines the error types for all components of the application.
//! Errors are designed to be actionable: resolution failures always carry the
//! list of valid names so the caller can show the user what to type instead.

use std::path::PathBuf;

use thiserror::Error;

/// Authentication-related errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// Neither a password nor a token was supplied
    #[error(
        "Missing EarthExplorer credentials. Provide a password or a token (USGS_PASSWORD / USGS_TOKEN)"
    )]
    MissingCredentials,

    /// Username is empty or malformed
    #[error("Invalid username: {reason}")]
    InvalidUsername { reason: String },

    /// The service rejected the credentials or the session key
    #[error("Authentication rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    /// A re-authentication was attempted and the retried call was still rejected
    #[error("Session expired and re-authentication did not restore access")]
    SessionExpired,

    /// The session was explicitly closed
    #[error("Session already logged out")]
    LoggedOut,

    /// Login response carried no session key
    #[error("Login succeeded but the service returned no session key")]
    MissingSessionKey,

    /// Transport failure while logging in
    #[error("Network failure during authentication")]
    Network(#[from] NetworkError),
}

/// Transport and protocol errors, split into retryable and non-retryable
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Underlying HTTP client error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Request timed out
    #[error("Request to {endpoint} timed out")]
    Timeout { endpoint: String },

    /// Server responded with a non-success status
    #[error("Server returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// Service throttled the account
    #[error("Rate limited by the service: {message}")]
    RateLimited { message: String },

    /// Service returned an error code that is not transient
    #[error("Service error {code}: {message}")]
    Service { code: String, message: String },

    /// Response body could not be interpreted
    #[error("Malformed response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    /// Endpoint or download URL could not be built
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// Rate limiter could not be configured
    #[error("Invalid rate limit: {reason}")]
    RateLimiter { reason: String },
}

impl NetworkError {
    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            NetworkError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            NetworkError::Timeout { .. } | NetworkError::RateLimited { .. } => true,
            NetworkError::Status { status, .. } => *status >= 500 || *status == 429,
            NetworkError::Service { .. }
            | NetworkError::MalformedResponse { .. }
            | NetworkError::InvalidUrl { .. }
            | NetworkError::RateLimiter { .. } => false,
        }
    }
}

/// Catalog lookups (datasets, filters, scenes, download URLs)
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Authentication failed or could not be restored
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Transport or protocol failure
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Dataset alias is not known to the service
    #[error("Unknown dataset '{name}'. Closest matches: {}", .suggestions.join(" | "))]
    UnknownDataset {
        name: String,
        suggestions: Vec<String>,
    },
}

/// Filter expression parsing, resolution and scene filter validation
#[derive(Error, Debug)]
pub enum FilterError {
    /// The expression is not `field=value` terms joined by `&` and `|`
    #[error("Invalid filter syntax in '{expression}': {reason}")]
    InvalidSyntax { expression: String, reason: String },

    /// No filter of the dataset matches the field token
    #[error("Unknown filter field '{field}'. Available fields: {}", .available.join(" | "))]
    UnknownField {
        field: String,
        available: Vec<String>,
        suggestions: Vec<String>,
    },

    /// The field token matches more than one filter at the same precedence
    #[error("Filter field '{field}' is ambiguous, it matches: {}", .candidates.join(" | "))]
    AmbiguousField {
        field: String,
        candidates: Vec<String>,
    },

    /// The value is not one of the filter's enumerated values
    #[error("Invalid value '{value}' for filter '{field}'. Choose one of: {}", .available.join(" | "))]
    UnknownValue {
        field: String,
        value: String,
        available: Vec<String>,
        suggestions: Vec<String>,
    },

    /// Spatial, temporal or cloud cover constraint is malformed
    #[error("Invalid scene filter: {reason}")]
    InvalidSceneFilter { reason: String },
}

/// Download batch and transfer errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Transport failure during the transfer
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// URL resolution through the catalog failed
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// I/O error during file operations
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Body ended before the advertised length
    #[error("Incomplete download: received {received} bytes, expected {expected} bytes")]
    IncompleteDownload { received: u64, expected: u64 },

    /// Partial file could not be moved into place
    #[error("Atomic file operation failed: could not rename {temp_path} to {final_path}")]
    AtomicOperationFailed {
        temp_path: PathBuf,
        final_path: PathBuf,
    },

    /// The service offers no downloadable product for the scene
    #[error("No downloadable product available for {entity_id}")]
    Unavailable { entity_id: String },

    /// All attempts failed with retryable errors
    #[error("Maximum attempts ({attempts}) exceeded: {last_error}")]
    MaxAttemptsExceeded { attempts: u32, last_error: String },

    /// Batch was stopped before the task started
    #[error("Download cancelled before it started")]
    Cancelled,

    /// Task attempted an illegal state change
    #[error("Invalid task state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Configuration values are inconsistent
    #[error("Invalid download configuration: {0}")]
    ConfigurationError(String),
}

impl DownloadError {
    /// Whether another transfer attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Network(e) => e.is_retryable(),
            DownloadError::IncompleteDownload { .. } => true,
            _ => false,
        }
    }
}

/// Entity id lists and result writers
#[derive(Error, Debug)]
pub enum OutputError {
    /// Output extension is not one the crate writes
    #[error("Unsupported output format for {path}. Supported: .txt | .json | .geojson")]
    UnsupportedFormat { path: PathBuf },

    /// I/O error reading or writing a file
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failed
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Id list has no dataset header and none was given
    #[error("No dataset given and {path} has no '#dataset=<name>' header")]
    MissingDataset { path: PathBuf },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format: {0}")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// Could not read the configuration file
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Network(e)
            | AppError::Catalog(CatalogError::Network(e))
            | AppError::Download(DownloadError::Network(e)) => e.is_retryable(),
            AppError::Download(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Auth(_) | AppError::Catalog(CatalogError::Auth(_)) => "authentication",
            AppError::Network(_) | AppError::Catalog(CatalogError::Network(_)) => "network",
            AppError::Catalog(_) => "catalog",
            AppError::Filter(_) => "filter",
            AppError::Download(_) => "download",
            AppError::Output(_) => "output",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Authentication result type alias
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Network result type alias
pub type NetworkResult<T> = std::result::Result<T, NetworkError>;

/// Catalog result type alias
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Filter result type alias
pub type FilterResult<T> = std::result::Result<T, FilterError>;

/// Download result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// Output result type alias
pub type OutputResult<T> = std::result::Result<T, OutputError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

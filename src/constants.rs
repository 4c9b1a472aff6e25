//! Application constants for USGS Explorer
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// Environment variable names for authentication
pub mod env {
    /// Environment variable name for the EarthExplorer username
    pub const USERNAME: &str = "USGS_USERNAME";

    /// Environment variable name for the EarthExplorer password
    pub const PASSWORD: &str = "USGS_PASSWORD";

    /// Environment variable name for the EarthExplorer application token
    pub const TOKEN: &str = "USGS_TOKEN";
}

/// M2M service URLs, endpoints and protocol markers
pub mod m2m {
    /// Stable JSON API root
    pub const BASE_URL: &str = "https://m2m.cr.usgs.gov/api/api/json/stable/";

    /// Header carrying the session key on every authenticated call
    pub const AUTH_HEADER: &str = "X-Auth-Token";

    /// Largest page the scene-search endpoint accepts in one call
    pub const MAX_PAGE_SIZE: u32 = 10_000;

    /// Page size used when the caller does not choose one
    pub const DEFAULT_PAGE_SIZE: u32 = 10_000;

    /// Upper bound on scene-search calls for one enumeration
    pub const MAX_SEARCH_PAGES: usize = 100_000;

    /// Error codes meaning the session key or credentials were rejected
    pub const AUTH_ERROR_CODES: &[&str] = &["AUTH_INVALID", "AUTH_UNAUTHROIZED", "AUTH_KEY_INVALID"];

    /// Error code returned when too many requests are in flight for the account
    pub const RATE_LIMIT_CODE: &str = "RATE_LIMIT";

    /// Error code returned for an unknown dataset alias
    pub const DATASET_INVALID_CODE: &str = "DATASET_INVALID";

    /// Download systems whose products can be fetched as a single archive
    pub const DOWNLOAD_SYSTEMS: &[&str] = &["dds", "ls_zip", "dds_zip"];

    /// Endpoint names
    pub mod endpoints {
        pub const LOGIN: &str = "login";
        pub const LOGIN_TOKEN: &str = "login-token";
        pub const LOGOUT: &str = "logout";
        pub const DATASET_SEARCH: &str = "dataset-search";
        pub const DATASET_FILTERS: &str = "dataset-filters";
        pub const SCENE_SEARCH: &str = "scene-search";
        pub const DOWNLOAD_OPTIONS: &str = "download-options";
        pub const DOWNLOAD_REQUEST: &str = "download-request";
        pub const DOWNLOAD_RETRIEVE: &str = "download-retrieve";
    }
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = "USGS-Explorer/0.1.0 (Remote Sensing Tool)";

    /// Default timeout for catalog API calls
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Longest wait for response headers or the next body chunk of a file transfer
    pub const TRANSFER_READ_TIMEOUT: Duration = Duration::from_secs(600);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 16;
}

/// Rate limiting and retry configuration
pub mod limits {
    /// Default rate limit for catalog requests (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 5;

    /// Maximum retry attempts for retryable catalog requests
    pub const MAX_RETRIES: u32 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const RETRY_BASE_DELAY_MS: u64 = 1000;

    /// Maximum backoff delay (milliseconds)
    pub const MAX_BACKOFF_MS: u64 = 30_000;

    /// Jitter factor for randomizing delays (0.0-1.0)
    pub const BACKOFF_JITTER_FACTOR: f64 = 0.1;
}

/// Download batch configuration
pub mod download {
    use super::Duration;

    /// Default number of concurrent download workers
    pub const DEFAULT_MAX_THREAD: usize = 5;

    /// Upper bound on concurrent download workers
    pub const MAX_THREAD_LIMIT: usize = 32;

    /// Attempts per file before the task is marked failed
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Base delay between transfer attempts
    pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

    /// Cap on the delay between transfer attempts
    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(60);

    /// Number of ids resolved per download-options / download-request call
    pub const URL_BATCH_SIZE: usize = 100;

    /// Poll interval while the service prepares requested products
    pub const RETRIEVE_POLL_INTERVAL: Duration = Duration::from_secs(10);

    /// Number of download-retrieve polls before giving up on preparing products
    pub const RETRIEVE_MAX_POLLS: u32 = 30;

    /// Label attached to download requests so they can be retrieved later
    pub const REQUEST_LABEL_PREFIX: &str = "usgs-explorer";
}

/// Suggestion ranking configuration
pub mod suggest {
    /// Default number of suggestions returned for an unknown name
    pub const DEFAULT_TOP_K: usize = 50;
}

/// File operation constants
pub mod files {
    /// Suffix for in-progress transfers, renamed away on success
    pub const PARTIAL_FILE_SUFFIX: &str = ".part";

    /// Header line prefix naming the dataset in an entity id list
    pub const DATASET_HEADER: &str = "#dataset=";

    /// Project-local configuration file name
    pub const LOCAL_CONFIG_FILE: &str = "usgs-explorer.toml";

    /// Directory under the user config dir holding config.toml
    pub const CONFIG_DIR_NAME: &str = "usgs-explorer";
}

/// Progress reporting constants
pub mod progress {
    use super::Duration;

    /// Spinner tick rate for per-task bars
    pub const TICK_INTERVAL: Duration = Duration::from_millis(120);
}

// Re-export commonly used constants for convenience
pub use download::DEFAULT_MAX_THREAD;
pub use env::{PASSWORD as ENV_PASSWORD, TOKEN as ENV_TOKEN, USERNAME as ENV_USERNAME};
pub use http::USER_AGENT;
pub use m2m::{BASE_URL as M2M_BASE_URL, MAX_PAGE_SIZE};
pub use suggest::DEFAULT_TOP_K;

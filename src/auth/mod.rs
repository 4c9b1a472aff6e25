//! EarthExplorer credentials
//!
//! This module turns a username plus password or token into the login call
//! the session performs, and reports which credential variables are set.
//!
//! # Examples
//!
//! ```rust,no_run
//! use usgs_explorer::auth::Credentials;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let credentials = Credentials::from_env()?;
//! println!("Logging in as {}", credentials.username());
//! # Ok(())
//! # }
//! ```

pub mod credentials;

// Re-export main public API
pub use credentials::{get_auth_status, AuthStatus, Credentials, Secret};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_structure() {
        // Ensure public API is accessible
        let status = get_auth_status();
        let _ = status.has_credentials();
    }
}

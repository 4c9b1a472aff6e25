//! USGS Explorer Library
//!
//! A Rust library for searching the USGS M2M catalog and downloading scenes.
//! Provides metadata filter expressions with suggestions for misspelled
//! names, lazy paginated search and concurrent downloads with retries.

pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};

//! Command-line interface components
//!
//! This module contains CLI-specific code for USGS Explorer: argument
//! parsing and the handlers that drive searches, downloads and catalog
//! discovery.

pub mod args;
pub mod commands;

pub use args::{
    Cli, Commands, CredentialArgs, DownloadArgs, GlobalArgs, InfoAction, InfoArgs, SearchArgs,
};
pub use commands::{format_filter_table, handle_download, handle_info, handle_search};

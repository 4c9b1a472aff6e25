//! Command-line argument parsing for USGS Explorer
//!
//! This module defines the CLI structure using clap derive macros: scene
//! search, bulk download from an id list, and dataset/filter discovery.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::app::download::ProgressMode;
use crate::app::filter::{AcquisitionFilter, CloudCoverFilter, SceneFilter, SpatialFilter};
use crate::auth::Credentials;
use crate::constants::env;
use crate::errors::{AuthError, AuthResult, FilterResult};

/// USGS Explorer - Search and download scenes from the USGS M2M catalog
#[derive(Parser, Debug)]
#[command(
    name = "usgs_explorer",
    version,
    about = "Search the USGS EarthExplorer catalog and download scenes in bulk",
    long_about = "Search USGS EarthExplorer datasets through the M2M API with spatial, temporal, cloud and
metadata filters, then download the matching scenes concurrently with retries and progress bars."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search scenes of a dataset
    Search(SearchArgs),

    /// Download the scenes listed in an entity id file
    Download(DownloadArgs),

    /// Show datasets and dataset filters
    Info(InfoArgs),
}

/// EarthExplorer login, shared by every command that talks to the service
#[derive(Args, Debug, Clone, Default)]
pub struct CredentialArgs {
    /// EarthExplorer username
    #[arg(short, long, env = env::USERNAME)]
    pub username: Option<String>,

    /// EarthExplorer password
    #[arg(short, long, env = env::PASSWORD, hide_env_values = true)]
    pub password: Option<String>,

    /// M2M application token, used instead of the password when both are set
    #[arg(short, long, env = env::TOKEN, hide_env_values = true)]
    pub token: Option<String>,
}

impl CredentialArgs {
    /// Turn the flags into credentials
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingCredentials` without a username or a secret
    pub fn credentials(&self) -> AuthResult<Credentials> {
        let username = self
            .username
            .clone()
            .ok_or(AuthError::MissingCredentials)?;
        Credentials::new(username, self.password.clone(), self.token.clone())
    }
}

/// Arguments for the search command
#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    #[command(flatten)]
    pub credentials: CredentialArgs,

    /// Dataset alias, e.g. "landsat_tm_c2_l1" or "declassii"
    pub dataset: String,

    /// Write results to a .txt, .json or .geojson file instead of printing ids
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Point that scenes must cover
    #[arg(
        short,
        long,
        num_args = 2,
        value_names = ["LON", "LAT"],
        allow_negative_numbers = true,
        conflicts_with = "bbox"
    )]
    pub location: Option<Vec<f64>>,

    /// Bounding box that scenes must intersect
    #[arg(
        short,
        long,
        num_args = 4,
        value_names = ["XMIN", "YMIN", "XMAX", "YMAX"],
        allow_negative_numbers = true
    )]
    pub bbox: Option<Vec<f64>>,

    /// Maximum cloud cover in percent
    #[arg(short, long, value_name = "PERCENT")]
    pub clouds: Option<u8>,

    /// Acquisition date interval, both ends inclusive
    #[arg(short, long, num_args = 2, value_names = ["START", "END"])]
    pub interval_date: Option<Vec<String>>,

    /// Acquisition months to keep, e.g. 6,7,8
    #[arg(long, value_delimiter = ',', value_name = "MONTHS")]
    pub months: Option<Vec<u8>>,

    /// Metadata filter expression, e.g. "camera=L & DOWNLOAD_AVAILABLE=Y"; "field=?" lists values
    #[arg(short, long, value_name = "EXPR")]
    pub filter: Option<String>,

    /// Maximum number of scenes to return
    #[arg(short = 'm', long, value_name = "N")]
    pub limit: Option<usize>,

    /// Records requested per scene-search call
    #[arg(long, value_name = "N")]
    pub page_size: Option<u32>,

    /// Show a progress bar while pages are fetched
    #[arg(long)]
    pub pbar: bool,
}

/// Arguments for the download command
#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub credentials: CredentialArgs,

    /// File with one entity id per line, optionally headed by "#dataset=<name>"
    pub textfile: PathBuf,

    /// Dataset alias, overrides the file header
    #[arg(short, long)]
    pub dataset: Option<String>,

    /// Directory receiving the downloaded files
    #[arg(short, long, default_value = ".", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Progress display: silent|aggregate|per-task (or 0|1|2)
    #[arg(short = 'b', long = "pbar", value_name = "MODE")]
    pub progress: Option<ProgressMode>,

    /// Number of concurrent download workers
    #[arg(short, long, value_name = "N")]
    pub max_thread: Option<usize>,

    /// Attempts per file before it is reported as failed
    #[arg(long, value_name = "N")]
    pub max_attempts: Option<u32>,

    /// Download again even when a finished file already exists
    #[arg(long)]
    pub overwrite: bool,
}

/// Arguments for the info command
#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(subcommand)]
    pub action: InfoAction,
}

/// Info subcommands
#[derive(Subcommand, Debug)]
pub enum InfoAction {
    /// List dataset aliases
    Dataset {
        #[command(flatten)]
        credentials: CredentialArgs,

        /// Include event datasets
        #[arg(short, long)]
        all: bool,
    },

    /// Show the metadata filters of a dataset
    Filters {
        #[command(flatten)]
        credentials: CredentialArgs,

        /// Dataset alias
        dataset: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level from the flags, falling back to `configured`
    pub fn log_level(&self, configured: &str) -> tracing::Level {
        if self.global.quiet {
            tracing::Level::ERROR
        } else if self.global.very_verbose {
            tracing::Level::DEBUG
        } else if self.global.verbose {
            tracing::Level::INFO
        } else {
            configured.parse().unwrap_or(tracing::Level::WARN)
        }
    }
}

impl SearchArgs {
    /// Scene filter from the spatial, temporal and cloud flags
    ///
    /// Everything is checked here, before any request is made. The metadata
    /// expression needs the dataset schema and is compiled separately.
    pub fn scene_filter(&self) -> FilterResult<SceneFilter> {
        let mut filter = SceneFilter::new();

        if let Some(&[xmin, ymin, xmax, ymax]) = self.bbox.as_deref() {
            filter = filter.with_spatial(SpatialFilter::bbox(xmin, ymin, xmax, ymax));
        } else if let Some(&[longitude, latitude]) = self.location.as_deref() {
            filter = filter.with_spatial(SpatialFilter::point(longitude, latitude));
        }

        if let Some([start, end]) = self.interval_date.as_deref() {
            filter = filter.with_acquisition(AcquisitionFilter::new(start, end)?);
        }

        if let Some(clouds) = self.clouds {
            filter = filter.with_cloud_cover(CloudCoverFilter::max(clouds)?);
        }

        if let Some(months) = &self.months {
            filter = filter.with_months(months.clone())?;
        }

        Ok(filter)
    }
}

//! USGS Explorer CLI application
//!
//! Command-line interface for searching the USGS M2M catalog and downloading
//! scenes in bulk.

use std::process;

use tracing::{info, Level};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, EnvFilter};

use usgs_explorer::cli::{handle_download, handle_info, handle_search, Cli, Commands};
use usgs_explorer::config::AppConfig;
use usgs_explorer::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Credentials may live in a .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();
    let config = AppConfig::load(cli.global.config.as_deref()).await?;

    init_logging(&cli, &config);
    info!("USGS Explorer v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Search(args) => {
            info!("Executing search command");
            handle_search(args, &config).await
        }
        Commands::Download(args) => {
            info!("Executing download command");
            handle_download(args, &config).await
        }
        Commands::Info(args) => {
            info!("Executing info command");
            handle_info(args, &config).await
        }
    }
}

/// Initialize logging from the verbosity flags and the `[logging]` section
fn init_logging(cli: &Cli, config: &AppConfig) {
    let log_level = cli.log_level(&config.logging.level);

    let mut filter = EnvFilter::from_default_env();
    match format!("usgs_explorer={}", log_level).parse::<Directive>() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring log directive: {}", e),
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(log_level >= Level::DEBUG)
        .with_writer(std::io::stderr)
        .init();
}

//! Command handlers for the USGS Explorer CLI
//!
//! Each handler validates everything it can locally, then opens one catalog
//! session, does its work and logs out on every exit path.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::app::download::{DownloadConfig, DownloadManager, HttpTransfer};
use crate::app::filter::{parse, CompileOutcome, FilterCompiler, FilterNode, SceneFilter, ValueListing};
use crate::app::models::{MetadataFilter, MetadataType};
use crate::app::output::{validate_output_path, write_scenes, OutputFormat};
use crate::app::{
    create_shutdown_channel, BatchReport, CatalogClient, ClientConfig, FilterCache, IdList,
    SceneQuery, ScenePaginator, SignalHandler,
};
use crate::cli::{CredentialArgs, DownloadArgs, InfoAction, InfoArgs, SearchArgs};
use crate::config::AppConfig;
use crate::errors::{AppError, FilterError, Result};

/// Dataset aliases with this prefix are hidden unless `--all` is given
const EVENT_DATASET_PREFIX: &str = "event";

/// Handle the search command
///
/// Output path, scene filter flags and the filter expression's syntax are
/// checked before the first request. Without `--output` the entity ids are
/// streamed to stdout as pages arrive.
pub async fn handle_search(args: SearchArgs, config: &AppConfig) -> Result<()> {
    let format = args
        .output
        .as_deref()
        .map(validate_output_path)
        .transpose()?;
    let scene_filter = args.scene_filter()?;
    let expression = args.filter.as_deref().map(parse).transpose()?;

    let (client_config, _) = config.to_runtime_config();
    let client = connect(&args.credentials, client_config)?;
    in_session(&client, run_search(&client, &args, format, scene_filter, expression)).await
}

async fn run_search(
    client: &Arc<CatalogClient>,
    args: &SearchArgs,
    format: Option<OutputFormat>,
    mut scene_filter: SceneFilter,
    expression: Option<FilterNode>,
) -> Result<()> {
    client.login().await?;

    if let Some(node) = expression {
        let schema = client.filters_for(&args.dataset).await?;
        let compiler = FilterCompiler::new(&schema).with_suggestions(client.suggestions());
        match compiler.compile(&node) {
            Ok(CompileOutcome::Query(query)) => scene_filter = scene_filter.with_metadata(query),
            Ok(CompileOutcome::ValueListing(listing)) => {
                print!("{}", format_value_listing(&listing));
                return Ok(());
            }
            Err(e @ FilterError::UnknownField { .. }) => {
                eprintln!("Filters of {}:\n{}", args.dataset, format_filter_table(&schema));
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        }
    }

    let metadata_type = format.map_or(MetadataType::None, OutputFormat::metadata_type);
    let mut query = SceneQuery::new(args.dataset.as_str())
        .with_filter(scene_filter)
        .with_metadata_type(metadata_type)
        .with_limit(args.limit);
    if let Some(page_size) = args.page_size {
        query = query.with_page_size(page_size);
    }

    let mut paginator = ScenePaginator::new(client.clone(), query);
    let bar = args.pbar.then(search_progress_bar);
    if let Some(bar) = &bar {
        let bar = bar.clone();
        paginator = paginator.on_page(move |page| {
            bar.set_length(page.expected);
            bar.set_position(page.fetched as u64);
        });
    }

    let start = Instant::now();
    let found = match &args.output {
        Some(path) => {
            let scenes = paginator.collect_all().await?;
            write_scenes(path, &args.dataset, &scenes)?;
            println!("Saved {} scenes to {}", scenes.len(), path.display());
            scenes.len()
        }
        None => {
            let mut scenes = paginator.stream();
            let mut count = 0;
            while let Some(scene) = scenes.next().await {
                println!("{}", scene?.entity_id);
                count += 1;
            }
            count
        }
    };

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    if found == 0 {
        eprintln!("No scenes of {} match the given filters", args.dataset);
    }
    info!("Search returned {} scenes in {:?}", found, start.elapsed());
    Ok(())
}

/// Handle the download command
///
/// Per-file failures are listed after the summary. The command fails only
/// when every attempted file failed or the batch could not run at all.
pub async fn handle_download(args: DownloadArgs, config: &AppConfig) -> Result<()> {
    let list = IdList::read(&args.textfile)?;
    let dataset = list.dataset_or(args.dataset.as_deref(), &args.textfile)?;
    if list.entity_ids.is_empty() {
        println!("No entity ids in {}", args.textfile.display());
        return Ok(());
    }

    let (client_config, file_config) = config.to_runtime_config();
    let download_config = merge_download_flags(&args, file_config);
    let transfer = Arc::new(HttpTransfer::new(&client_config)?);
    let client = connect(&args.credentials, client_config)?;
    let manager = DownloadManager::new(client.clone(), transfer, download_config)?;

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let signal_task = SignalHandler::new(shutdown_tx).setup();

    let start = Instant::now();
    let result = run_download(
        &client,
        &manager,
        &dataset,
        &list.entity_ids,
        &args.output_dir,
        shutdown_rx,
    )
    .await;
    signal_task.abort();
    let report = close(&client, result).await?;

    print_report(&report, &args.output_dir);
    info!("Download batch finished in {:?}", start.elapsed());

    if report.is_hard_failure() {
        return Err(AppError::generic(format!(
            "All {} attempted downloads failed",
            report.attempted()
        )));
    }
    Ok(())
}

async fn run_download(
    client: &CatalogClient,
    manager: &DownloadManager,
    dataset: &str,
    entity_ids: &[String],
    output_dir: &Path,
    shutdown: tokio::sync::broadcast::Receiver<()>,
) -> Result<BatchReport> {
    client.login().await?;
    Ok(manager
        .download(dataset, entity_ids, output_dir, Some(shutdown))
        .await?)
}

/// Command-line flags win over the configuration file
fn merge_download_flags(args: &DownloadArgs, file_config: DownloadConfig) -> DownloadConfig {
    DownloadConfig {
        max_thread: args.max_thread.unwrap_or(file_config.max_thread),
        max_attempts: args.max_attempts.unwrap_or(file_config.max_attempts),
        overwrite: args.overwrite || file_config.overwrite,
        progress: args.progress.unwrap_or(file_config.progress),
        ..file_config
    }
}

fn print_report(report: &BatchReport, output_dir: &Path) {
    println!("\n📊 Download Summary:");
    println!("  Requested: {}", report.total());
    println!("  Downloaded: {}", report.done.len());
    println!("  Skipped (already present): {}", report.skipped.len());
    println!("  Failed: {}", report.failed.len());
    println!(
        "  Data received: {:.1} MB",
        report.total_bytes() as f64 / 1_048_576.0
    );
    println!("  Output directory: {}", output_dir.display());

    if !report.failed.is_empty() {
        eprintln!("\nFailed downloads:");
        for failure in &report.failed {
            eprintln!(
                "  • {} ({} attempts): {}",
                failure.entity_id, failure.attempts, failure.reason
            );
        }
    }
}

/// Handle the info command
pub async fn handle_info(args: InfoArgs, config: &AppConfig) -> Result<()> {
    let (client_config, _) = config.to_runtime_config();
    match args.action {
        InfoAction::Dataset { credentials, all } => {
            let client = connect(&credentials, client_config)?;
            in_session(&client, list_datasets(&client, all)).await
        }
        InfoAction::Filters {
            credentials,
            dataset,
        } => {
            let client = connect(&credentials, client_config)?;
            in_session(&client, show_filters(&client, &dataset)).await
        }
    }
}

async fn list_datasets(client: &CatalogClient, all: bool) -> Result<()> {
    client.login().await?;
    let names = visible_datasets(client.dataset_names().await?, all);
    if names.is_empty() {
        println!("No datasets available to this account.");
        return Ok(());
    }
    for name in &names {
        println!("{}", name);
    }
    debug!("Listed {} datasets", names.len());
    Ok(())
}

async fn show_filters(client: &CatalogClient, dataset: &str) -> Result<()> {
    client.login().await?;
    let schema = client.filters_for(dataset).await?;
    print!("{}", format_filter_table(&schema));
    Ok(())
}

fn connect(credentials: &CredentialArgs, config: ClientConfig) -> Result<Arc<CatalogClient>> {
    let credentials = credentials.credentials()?;
    debug!(
        "Connecting as {} with {}",
        credentials.username(),
        credentials.secret().kind()
    );
    let client = CatalogClient::new(config, credentials, Arc::new(FilterCache::new()))?;
    Ok(Arc::new(client))
}

/// Run `work` until it finishes or the process is interrupted, then log out
async fn in_session<T, F>(client: &CatalogClient, work: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let (shutdown_tx, mut shutdown_rx) = create_shutdown_channel();
    let signal_task = SignalHandler::new(shutdown_tx).setup();
    let result = tokio::select! {
        result = work => result,
        _ = shutdown_rx.recv() => Err(AppError::generic("Interrupted")),
    };
    signal_task.abort();
    close(client, result).await
}

/// Log out, then hand back the command's own result
async fn close<T>(client: &CatalogClient, result: Result<T>) -> Result<T> {
    if let Err(e) = client.logout().await {
        warn!("Logout failed: {}", e);
    }
    result
}

fn visible_datasets(names: Vec<String>, all: bool) -> Vec<String> {
    if all {
        return names;
    }
    names
        .into_iter()
        .filter(|name| !name.to_lowercase().starts_with(EVENT_DATASET_PREFIX))
        .collect()
}

fn search_progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} scenes")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar
}

/// Filter schema as a table of id, label and SQL column name
pub fn format_filter_table(filters: &[MetadataFilter]) -> String {
    if filters.is_empty() {
        return "No metadata filters for this dataset.\n".to_string();
    }

    let id_width = column_width(filters.iter().map(|f| f.id.len()), "field id");
    let label_width = column_width(filters.iter().map(|f| f.label.len()), "field lbl");
    let sql_width = column_width(filters.iter().map(|f| f.sql_name.len()), "field sql");

    let mut table = format!(
        "{:<id_width$} {:<label_width$} {:<sql_width$}\n",
        "field id", "field lbl", "field sql",
    );
    table.push_str(&"─".repeat(id_width + label_width + sql_width + 2));
    table.push('\n');
    for filter in filters {
        table.push_str(&format!(
            "{:<id_width$} {:<label_width$} {:<sql_width$}\n",
            filter.id, filter.label, filter.sql_name,
        ));
    }
    table
}

fn column_width(lengths: impl Iterator<Item = usize>, header: &str) -> usize {
    lengths.max().unwrap_or(0).max(header.len())
}

fn format_value_listing(listing: &ValueListing) -> String {
    let mut text = format!(
        "Values of '{}' ({}):\n",
        listing.filter.label, listing.filter.sql_name
    );
    if listing.values.is_empty() {
        text.push_str("  (free text, no fixed values)\n");
    }
    for value in &listing.values {
        text.push_str(&format!("  {:<8} {}\n", value.id, value.label));
    }
    text
}

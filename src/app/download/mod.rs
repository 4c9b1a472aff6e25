//! Concurrent scene downloads
//!
//! A batch runs in three phases:
//! - ids are deduplicated and matched against finished files in the output
//!   directory (`<entity_id>.<ext>`, never `.part`) which are skipped
//! - the remaining ids are resolved to URLs in fixed-size batches and pushed
//!   onto a shared queue as soon as each batch resolves
//! - `max_thread` workers stream each URL to `<entity_id>.part` and rename it
//!   into place, retrying retryable failures with capped exponential backoff
//!
//! Failures stay local to their task; the `BatchReport` lists every id.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use usgs_explorer::app::client::{CatalogClient, ClientConfig, FilterCache};
//! use usgs_explorer::app::download::{DownloadConfig, DownloadManager, HttpTransfer};
//! use usgs_explorer::auth::Credentials;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::default();
//! let transfer = Arc::new(HttpTransfer::new(&config)?);
//! let client = Arc::new(CatalogClient::new(
//!     config,
//!     Credentials::from_env()?,
//!     Arc::new(FilterCache::new()),
//! )?);
//!
//! let manager = DownloadManager::new(client, transfer, DownloadConfig::default())?;
//! let ids = vec!["LT50380372012126EDC00".to_string()];
//! let report = manager
//!     .download("landsat_tm_c2_l1", &ids, Path::new("downloads"), None)
//!     .await?;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::constants::files;
use crate::errors::{CatalogError, DownloadError, DownloadResult};

pub mod config;
pub mod progress;
pub mod report;
pub mod resolver;
pub mod task;
pub mod transfer;
mod worker;

#[cfg(test)]
pub mod testing;

pub use config::{DownloadConfig, DownloadConfigBuilder};
pub use progress::{
    AggregateProgress, LogProgress, PerTaskProgress, ProgressMode, ProgressReporter,
    SilentProgress,
};
pub use report::{BatchReport, CompletedDownload, FailedDownload, SkippedDownload};
pub use resolver::UrlResolver;
pub use task::{DownloadTask, TaskStatus};
pub use transfer::{ByteProgress, FileTransfer, HttpTransfer, TransferOutcome};

use worker::{QueuedTask, Worker};

/// Runs download batches over a resolver and a transfer implementation
pub struct DownloadManager {
    resolver: Arc<dyn UrlResolver>,
    transfer: Arc<dyn FileTransfer>,
    progress: Arc<dyn ProgressReporter>,
    config: DownloadConfig,
}

impl DownloadManager {
    /// Create a manager whose reporter follows `config.progress`
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::ConfigurationError` if the configuration is invalid
    pub fn new(
        resolver: Arc<dyn UrlResolver>,
        transfer: Arc<dyn FileTransfer>,
        config: DownloadConfig,
    ) -> DownloadResult<Self> {
        config.validate()?;
        Ok(Self {
            progress: config.progress.reporter(),
            resolver,
            transfer,
            config,
        })
    }

    /// Replace the reporter chosen from the progress mode
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Download every id of `dataset` into `output_dir`
    ///
    /// A message on `shutdown` stops workers from taking new tasks; transfers
    /// in flight finish and tasks never started are reported as cancelled.
    ///
    /// # Errors
    ///
    /// Per-task failures are part of the report. An error is returned only if
    /// the output directory is unusable, or if authentication fails or the
    /// dataset is unknown while resolving URLs.
    pub async fn download(
        &self,
        dataset: &str,
        entity_ids: &[String],
        output_dir: &Path,
        shutdown: Option<broadcast::Receiver<()>>,
    ) -> DownloadResult<BatchReport> {
        tokio::fs::create_dir_all(output_dir).await?;

        let ids = dedupe(entity_ids);
        let mut slots: Vec<Option<DownloadTask>> =
            ids.iter().map(|id| Some(DownloadTask::new(id.as_str()))).collect();
        self.progress.start(slots.len());
        info!(
            "Downloading {} scenes of {} into {}",
            slots.len(),
            dataset,
            output_dir.display()
        );

        if !self.config.overwrite {
            let existing = finished_files(output_dir).await?;
            for task in slots.iter_mut().flatten() {
                if let Some(path) = existing.get(&task.entity_id) {
                    task.skip(path.clone())?;
                    self.notify(task);
                }
            }
        }
        let pending: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                slot.as_ref()
                    .map_or(false, |t| t.status() == TaskStatus::Pending)
            })
            .map(|(index, _)| index)
            .collect();
        if pending.len() < slots.len() {
            info!(
                "Skipping {} scenes already in {}",
                slots.len() - pending.len(),
                output_dir.display()
            );
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let cancel_tx = Arc::new(cancel_tx);
        let watcher = shutdown
            .and_then(|rx| watch_shutdown(rx, cancelled.clone(), cancel_tx.clone()));

        let (queue_tx, queue_rx) = mpsc::unbounded_channel::<QueuedTask>();
        let queue = Arc::new(Mutex::new(queue_rx));
        let worker_count = self.config.max_thread.min(pending.len());
        let handles: Vec<JoinHandle<Vec<QueuedTask>>> = (0..worker_count)
            .map(|id| {
                let worker = Worker {
                    id,
                    queue: queue.clone(),
                    transfer: self.transfer.clone(),
                    progress: self.progress.clone(),
                    output_dir: output_dir.to_path_buf(),
                    policy: self.config.retry_policy(),
                    cancelled: cancelled.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();
        debug!("Started {} download workers", worker_count);

        let mut fatal = None;
        for chunk in pending.chunks(self.config.url_batch_size) {
            if cancelled.load(Ordering::SeqCst) {
                break;
            }

            let batch_ids: Vec<String> = chunk.iter().map(|&i| ids[i].clone()).collect();
            // Resolution may poll for minutes; shutdown drops it mid-flight
            let resolved = tokio::select! {
                resolved = self.resolver.resolve(dataset, &batch_ids) => resolved,
                _ = cancel_rx.wait_for(|stop| *stop) => {
                    debug!("URL resolution interrupted by shutdown");
                    break;
                }
            };
            let urls = match resolved {
                Ok(urls) => urls,
                Err(e @ (CatalogError::Auth(_) | CatalogError::UnknownDataset { .. })) => {
                    cancelled.store(true, Ordering::SeqCst);
                    fatal = Some(DownloadError::Catalog(e));
                    break;
                }
                Err(e) => {
                    warn!("Could not resolve {} download URLs: {}", chunk.len(), e);
                    let error = DownloadError::Catalog(e);
                    for &index in chunk {
                        if let Some(task) = slots[index].as_mut() {
                            task.fail(&error)?;
                            self.notify(task);
                        }
                    }
                    continue;
                }
            };

            for &index in chunk {
                let Some(mut task) = slots[index].take() else {
                    continue;
                };
                match urls.get(&task.entity_id) {
                    Some(url) => {
                        task.resolve(url.clone())?;
                        self.notify(&task);
                        if let Err(mpsc::error::SendError((index, task))) =
                            queue_tx.send((index, task))
                        {
                            slots[index] = Some(task);
                        }
                    }
                    None => {
                        task.fail(&DownloadError::Unavailable {
                            entity_id: task.entity_id.clone(),
                        })?;
                        self.notify(&task);
                        slots[index] = Some(task);
                    }
                }
            }
        }
        drop(queue_tx);
        drop(cancel_tx);

        for handle in handles {
            match handle.await {
                Ok(finished) => {
                    for (index, task) in finished {
                        slots[index] = Some(task);
                    }
                }
                Err(e) => warn!("Download worker panicked: {}", e),
            }
        }
        if let Some(watcher) = watcher {
            watcher.abort();
        }

        // Whatever is still queued or unresolved was never started
        let mut leftover = queue.lock().await;
        while let Ok((index, task)) = leftover.try_recv() {
            slots[index] = Some(task);
        }
        for task in slots.iter_mut().flatten() {
            if !task.status().is_terminal() {
                task.fail(&DownloadError::Cancelled)?;
                self.notify(task);
            }
        }

        if let Some(error) = fatal {
            return Err(error);
        }

        let report = BatchReport::from_tasks(
            slots
                .into_iter()
                .zip(ids)
                .map(|(slot, id)| slot.unwrap_or_else(|| DownloadTask::new(id))),
        );
        self.progress.finish(&report);
        info!("Download batch finished: {}", report);
        Ok(report)
    }

    fn notify(&self, task: &DownloadTask) {
        self.progress.on_transition(&task.entity_id, task.status());
    }
}

/// Trimmed, non-empty ids in first-seen order
fn dedupe(entity_ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    entity_ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

/// Finished files in `dir` keyed by the text before their first dot
async fn finished_files(dir: &Path) -> DownloadResult<HashMap<String, PathBuf>> {
    let mut found = HashMap::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.ends_with(files::PARTIAL_FILE_SUFFIX) {
            continue;
        }
        let stem = name.split('.').next().unwrap_or(name);
        found
            .entry(stem.to_string())
            .or_insert_with(|| entry.path());
    }
    Ok(found)
}

/// Raise both cancellation signals once shutdown is broadcast; a signal
/// already sent counts
fn watch_shutdown(
    mut shutdown: broadcast::Receiver<()>,
    cancelled: Arc<AtomicBool>,
    cancel_tx: Arc<watch::Sender<bool>>,
) -> Option<JoinHandle<()>> {
    match shutdown.try_recv() {
        Ok(()) | Err(TryRecvError::Lagged(_)) => {
            cancelled.store(true, Ordering::SeqCst);
            cancel_tx.send_replace(true);
            None
        }
        Err(TryRecvError::Closed) => None,
        Err(TryRecvError::Empty) => Some(tokio::spawn(async move {
            match shutdown.recv().await {
                Err(RecvError::Closed) => {}
                Ok(()) | Err(RecvError::Lagged(_)) => {
                    info!("Shutdown requested, finishing transfers in flight");
                    cancelled.store(true, Ordering::SeqCst);
                    cancel_tx.send_replace(true);
                }
            }
        })),
    }
}

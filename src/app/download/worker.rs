//! Transfer worker
//!
//! Workers pull resolved tasks from the shared queue until it closes or the
//! batch is cancelled. A task is owned by exactly one worker from the moment
//! it is received until it is handed back in the worker's result list.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use super::progress::ProgressReporter;
use super::task::{DownloadTask, TaskStatus};
use super::transfer::{FileTransfer, TransferOutcome};
use crate::app::retry::RetryPolicy;
use crate::constants::files;
use crate::errors::{DownloadError, DownloadResult};

/// Task plus its position in the batch, so results can be put back in order
pub(super) type QueuedTask = (usize, DownloadTask);

pub(super) type SharedQueue = Arc<Mutex<mpsc::UnboundedReceiver<QueuedTask>>>;

pub(super) struct Worker {
    pub id: usize,
    pub queue: SharedQueue,
    pub transfer: Arc<dyn FileTransfer>,
    pub progress: Arc<dyn ProgressReporter>,
    pub output_dir: PathBuf,
    pub policy: RetryPolicy,
    pub cancelled: Arc<AtomicBool>,
}

impl Worker {
    /// Process tasks until the queue closes or the batch is cancelled
    pub async fn run(self) -> Vec<QueuedTask> {
        debug!("Worker {} starting", self.id);
        let mut finished = Vec::new();

        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                info!("Worker {} received shutdown signal", self.id);
                break;
            }

            let next = self.queue.lock().await.recv().await;
            let Some((index, mut task)) = next else {
                break;
            };

            if self.cancelled.load(Ordering::SeqCst) {
                self.settle(&mut task, Err(DownloadError::Cancelled));
                finished.push((index, task));
                break;
            }

            let result = self.download(&mut task).await;
            self.settle(&mut task, result);
            finished.push((index, task));
        }

        debug!("Worker {} finished {} tasks", self.id, finished.len());
        finished
    }

    /// Record the terminal state of a task and notify the reporter
    fn settle(&self, task: &mut DownloadTask, result: DownloadResult<(PathBuf, u64)>) {
        let transition = match result {
            Ok((path, bytes)) => {
                debug!("{} saved to {}", task.entity_id, path.display());
                task.complete(path, bytes)
            }
            Err(e) => {
                warn!("{} failed: {}", task.entity_id, e);
                task.fail(&e)
            }
        };
        match transition {
            Ok(()) => self.progress.on_transition(&task.entity_id, task.status()),
            Err(e) => warn!("{}: {}", task.entity_id, e),
        }
    }

    async fn download(&self, task: &mut DownloadTask) -> DownloadResult<(PathBuf, u64)> {
        let url = task.url.clone().ok_or_else(|| DownloadError::Unavailable {
            entity_id: task.entity_id.clone(),
        })?;
        task.transition(TaskStatus::Downloading)?;
        self.progress
            .on_transition(&task.entity_id, TaskStatus::Downloading);

        let partial = self
            .output_dir
            .join(format!("{}{}", task.entity_id, files::PARTIAL_FILE_SUFFIX));
        let entity_id = task.entity_id.clone();
        let progress = self.progress.clone();
        let on_bytes = move |bytes: u64| progress.on_bytes(&entity_id, bytes);

        loop {
            task.attempts += 1;
            let error = match self.transfer.fetch(&url, &partial, &on_bytes).await {
                Ok(outcome) => return self.finalize(&task.entity_id, &partial, outcome).await,
                Err(e) => e,
            };

            let retries_done = task.attempts - 1;
            if error.is_retryable()
                && self.policy.allows(retries_done)
                && !self.cancelled.load(Ordering::SeqCst)
            {
                let delay = self.policy.delay_for(task.attempts);
                warn!(
                    "Download of {} failed (attempt {}/{}): {}. Retrying in {}ms",
                    task.entity_id,
                    task.attempts,
                    self.policy.max_retries + 1,
                    error,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            remove_partial(&partial).await;
            if error.is_retryable() && !self.policy.allows(retries_done) {
                return Err(DownloadError::MaxAttemptsExceeded {
                    attempts: task.attempts,
                    last_error: error.to_string(),
                });
            }
            return Err(error);
        }
    }

    /// Move the partial file to `<entity_id><ext>`
    async fn finalize(
        &self,
        entity_id: &str,
        partial: &Path,
        outcome: TransferOutcome,
    ) -> DownloadResult<(PathBuf, u64)> {
        let final_path = self
            .output_dir
            .join(format!("{}{}", entity_id, outcome.extension()));
        if let Err(e) = tokio::fs::rename(partial, &final_path).await {
            debug!("Rename of {} failed: {}", partial.display(), e);
            remove_partial(partial).await;
            return Err(DownloadError::AtomicOperationFailed {
                temp_path: partial.to_path_buf(),
                final_path,
            });
        }
        Ok((final_path, outcome.bytes))
    }
}

async fn remove_partial(partial: &Path) {
    if tokio::fs::try_exists(partial).await.unwrap_or(false) {
        let _ = tokio::fs::remove_file(partial).await;
    }
}

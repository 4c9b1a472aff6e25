//! Per-entity download state machine

use std::fmt;
use std::path::PathBuf;

use url::Url;

use crate::errors::{DownloadError, DownloadResult};

/// Where a task is in its lifecycle
///
/// `Pending → UrlResolved → Downloading → {Done | Failed}`, with the
/// short-circuits `Pending → Skipped` for files already on disk and
/// `Pending | UrlResolved → Failed` for unavailable or cancelled tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Pending,
    UrlResolved,
    Downloading,
    Done,
    Skipped,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Skipped | TaskStatus::Failed)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, UrlResolved)
                | (Pending, Skipped)
                | (Pending, Failed)
                | (UrlResolved, Downloading)
                | (UrlResolved, Failed)
                | (Downloading, Done)
                | (Downloading, Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::UrlResolved => "url-resolved",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Done => "done",
            TaskStatus::Skipped => "skipped",
            TaskStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One entity id moving through a batch; owned by a single worker at a time
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub entity_id: String,
    pub url: Option<Url>,
    /// Final file once done, or the existing file when skipped
    pub path: Option<PathBuf>,
    pub bytes: u64,
    /// Transfer attempts made so far
    pub attempts: u32,
    pub failure: Option<String>,
    status: TaskStatus,
}

impl DownloadTask {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            url: None,
            path: None,
            bytes: 0,
            attempts: 0,
            failure: None,
            status: TaskStatus::Pending,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Move to `next`, rejecting anything the lifecycle does not allow
    pub fn transition(&mut self, next: TaskStatus) -> DownloadResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DownloadError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn resolve(&mut self, url: Url) -> DownloadResult<()> {
        self.transition(TaskStatus::UrlResolved)?;
        self.url = Some(url);
        Ok(())
    }

    pub fn skip(&mut self, existing: PathBuf) -> DownloadResult<()> {
        self.transition(TaskStatus::Skipped)?;
        self.path = Some(existing);
        Ok(())
    }

    pub fn complete(&mut self, path: PathBuf, bytes: u64) -> DownloadResult<()> {
        self.transition(TaskStatus::Done)?;
        self.path = Some(path);
        self.bytes = bytes;
        Ok(())
    }

    pub fn fail(&mut self, error: &DownloadError) -> DownloadResult<()> {
        self.transition(TaskStatus::Failed)?;
        self.failure = Some(error.to_string());
        Ok(())
    }
}

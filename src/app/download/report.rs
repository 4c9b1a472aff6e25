//! Outcome of a download batch

use std::fmt;
use std::path::PathBuf;

use super::task::{DownloadTask, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedDownload {
    pub entity_id: String,
    pub path: PathBuf,
    pub bytes: u64,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDownload {
    pub entity_id: String,
    /// The finished file that was already there
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDownload {
    pub entity_id: String,
    pub reason: String,
    pub attempts: u32,
}

/// Done, skipped and failed ids, each list in input order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub done: Vec<CompletedDownload>,
    pub skipped: Vec<SkippedDownload>,
    pub failed: Vec<FailedDownload>,
}

impl BatchReport {
    /// Sort terminal tasks into the three lists
    ///
    /// Tasks that somehow never reached a terminal state are reported as failed.
    pub fn from_tasks(tasks: impl IntoIterator<Item = DownloadTask>) -> Self {
        let mut report = Self::default();
        for task in tasks {
            match task.status() {
                TaskStatus::Done => report.done.push(CompletedDownload {
                    path: task.path.unwrap_or_default(),
                    entity_id: task.entity_id,
                    bytes: task.bytes,
                    attempts: task.attempts,
                }),
                TaskStatus::Skipped => report.skipped.push(SkippedDownload {
                    path: task.path.unwrap_or_default(),
                    entity_id: task.entity_id,
                }),
                status => report.failed.push(FailedDownload {
                    reason: task
                        .failure
                        .unwrap_or_else(|| format!("stopped while {}", status)),
                    entity_id: task.entity_id,
                    attempts: task.attempts,
                }),
            }
        }
        report
    }

    pub fn total(&self) -> usize {
        self.done.len() + self.skipped.len() + self.failed.len()
    }

    /// Tasks that went past the skip check
    pub fn attempted(&self) -> usize {
        self.done.len() + self.failed.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.done.iter().map(|d| d.bytes).sum()
    }

    /// Every attempted task failed
    pub fn is_hard_failure(&self) -> bool {
        !self.failed.is_empty() && self.done.is_empty()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} downloaded, {} skipped, {} failed",
            self.done.len(),
            self.skipped.len(),
            self.failed.len()
        )
    }
}

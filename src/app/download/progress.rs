//! Download progress hooks
//!
//! The manager calls a `ProgressReporter` on every task state transition and
//! on every chunk written. Reporters only display; they never influence the
//! batch, so every mode produces the same `BatchReport`.
//!
//! When stderr is not a terminal the bar modes fall back to log lines.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::report::BatchReport;
use super::task::TaskStatus;
use crate::constants::progress;

/// How a batch shows its progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressMode {
    /// Nothing is drawn
    Silent,
    /// One bar for the whole batch
    Aggregate,
    /// One line per task in flight
    #[default]
    PerTask,
}

impl ProgressMode {
    /// Reporter for this mode, degraded to log lines when stderr is not a tty
    pub fn reporter(self) -> Arc<dyn ProgressReporter> {
        match self {
            ProgressMode::Silent => Arc::new(SilentProgress),
            _ if !atty::is(atty::Stream::Stderr) => Arc::new(LogProgress::default()),
            ProgressMode::Aggregate => Arc::new(AggregateProgress::new()),
            ProgressMode::PerTask => Arc::new(PerTaskProgress::new()),
        }
    }
}

impl fmt::Display for ProgressMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProgressMode::Silent => "silent",
            ProgressMode::Aggregate => "aggregate",
            ProgressMode::PerTask => "per-task",
        };
        f.write_str(name)
    }
}

impl FromStr for ProgressMode {
    type Err = String;

    /// Accepts the mode names and the numeric levels 0, 1 and 2
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "0" | "silent" | "none" => Ok(ProgressMode::Silent),
            "1" | "aggregate" | "bar" => Ok(ProgressMode::Aggregate),
            "2" | "per-task" | "per_task" | "tasks" => Ok(ProgressMode::PerTask),
            other => Err(format!(
                "unknown progress mode '{}', expected silent|aggregate|per-task or 0|1|2",
                other
            )),
        }
    }
}

/// Hooks invoked by the download manager
pub trait ProgressReporter: Send + Sync + fmt::Debug {
    /// `total` tasks will go through transitions (skips included)
    fn start(&self, _total: usize) {}

    fn on_transition(&self, _entity_id: &str, _status: TaskStatus) {}

    fn on_bytes(&self, _entity_id: &str, _bytes: u64) {}

    fn finish(&self, _report: &BatchReport) {}
}

#[derive(Debug, Default)]
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {}

/// Progress as tracing events, for logs and non-interactive runs
#[derive(Debug, Default)]
pub struct LogProgress {
    total: AtomicUsize,
    finished: AtomicUsize,
}

impl ProgressReporter for LogProgress {
    fn start(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
        info!("Processing {} scenes", total);
    }

    fn on_transition(&self, entity_id: &str, status: TaskStatus) {
        if !status.is_terminal() {
            return;
        }
        let finished = self.finished.fetch_add(1, Ordering::Relaxed) + 1;
        let total = self.total.load(Ordering::Relaxed);
        match status {
            TaskStatus::Failed => warn!("[{}/{}] {} failed", finished, total, entity_id),
            _ => info!("[{}/{}] {} {}", finished, total, entity_id, status),
        }
    }

    fn finish(&self, report: &BatchReport) {
        info!("Batch finished: {}", report);
    }
}

/// Single bar over the batch with running counters
#[derive(Debug)]
pub struct AggregateProgress {
    bar: ProgressBar,
    done: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    bytes: AtomicU64,
}

impl AggregateProgress {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(0))
    }

    /// Build around an existing bar, e.g. a hidden one
    pub fn with_bar(bar: ProgressBar) -> Self {
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        Self {
            bar,
            done: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    fn refresh_message(&self) {
        self.bar.set_message(format!(
            "{} done, {} skipped, {} failed, {}",
            self.done.load(Ordering::Relaxed),
            self.skipped.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            HumanBytes(self.bytes.load(Ordering::Relaxed))
        ));
    }
}

impl Default for AggregateProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for AggregateProgress {
    fn start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.enable_steady_tick(progress::TICK_INTERVAL);
        self.refresh_message();
    }

    fn on_transition(&self, _entity_id: &str, status: TaskStatus) {
        let counter = match status {
            TaskStatus::Done => &self.done,
            TaskStatus::Skipped => &self.skipped,
            TaskStatus::Failed => &self.failed,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.bar.inc(1);
        self.refresh_message();
    }

    fn on_bytes(&self, _entity_id: &str, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn finish(&self, report: &BatchReport) {
        self.bar.finish_with_message(report.to_string());
    }
}

/// One spinner per task currently downloading
#[derive(Debug)]
pub struct PerTaskProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    received: Mutex<HashMap<String, u64>>,
}

impl PerTaskProgress {
    pub fn new() -> Self {
        Self::with_multi(MultiProgress::new())
    }

    pub fn with_multi(multi: MultiProgress) -> Self {
        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
            received: Mutex::new(HashMap::new()),
        }
    }

    fn spinner(&self, entity_id: &str) -> ProgressBar {
        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.blue} {prefix}: {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix(entity_id.to_string());
        bar.enable_steady_tick(progress::TICK_INTERVAL);
        bar
    }
}

impl Default for PerTaskProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for PerTaskProgress {
    fn on_transition(&self, entity_id: &str, status: TaskStatus) {
        let Ok(mut bars) = self.bars.lock() else {
            return;
        };
        match status {
            TaskStatus::Downloading => {
                let bar = self.spinner(entity_id);
                bar.set_message("downloading");
                bars.insert(entity_id.to_string(), bar);
            }
            TaskStatus::Done | TaskStatus::Failed | TaskStatus::Skipped => {
                let bar = bars
                    .remove(entity_id)
                    .unwrap_or_else(|| self.spinner(entity_id));
                bar.finish_with_message(status.to_string());
            }
            TaskStatus::Pending | TaskStatus::UrlResolved => {}
        }
    }

    fn on_bytes(&self, entity_id: &str, bytes: u64) {
        let total = match self.received.lock() {
            Ok(mut received) => {
                let entry = received.entry(entity_id.to_string()).or_default();
                *entry += bytes;
                *entry
            }
            Err(_) => return,
        };
        if let Ok(bars) = self.bars.lock() {
            if let Some(bar) = bars.get(entity_id) {
                bar.set_message(format!("downloading {}", HumanBytes(total)));
            }
        }
    }

    fn finish(&self, report: &BatchReport) {
        let _ = self.multi.println(report.to_string());
    }
}

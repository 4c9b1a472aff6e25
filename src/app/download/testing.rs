//! In-memory resolver, transfer and progress recorder for download tests

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;

use super::progress::ProgressReporter;
use super::resolver::UrlResolver;
use super::task::TaskStatus;
use super::transfer::{ByteProgress, FileTransfer, TransferOutcome};
use crate::errors::{CatalogResult, DownloadError, DownloadResult, NetworkError};

/// Resolves every id to `https://dl.example/<id>.tar` except the unavailable ones
#[derive(Debug, Default)]
pub struct FakeResolver {
    unavailable: HashSet<String>,
    batches: Mutex<Vec<Vec<String>>>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable(mut self, entity_id: &str) -> Self {
        self.unavailable.insert(entity_id.to_string());
        self
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl UrlResolver for FakeResolver {
    async fn resolve(
        &self,
        _dataset: &str,
        entity_ids: &[String],
    ) -> CatalogResult<HashMap<String, Url>> {
        self.batches.lock().unwrap().push(entity_ids.to_vec());
        tokio::task::yield_now().await;
        Ok(entity_ids
            .iter()
            .filter(|id| !self.unavailable.contains(*id))
            .map(|id| {
                let url = Url::parse(&format!("https://dl.example/{id}.tar")).unwrap();
                (id.clone(), url)
            })
            .collect())
    }
}

/// Scripted behaviour of one entity's transfers
#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    /// Fail with a retryable error this many times, then succeed
    FlakyTimes(u32),
    AlwaysRetryable,
    /// Fail at once with a non-retryable error
    Forbidden,
}

/// Writes `<id> payload` to the partial file unless scripted to fail
#[derive(Debug, Default)]
pub struct FakeTransfer {
    script: HashMap<String, Behaviour>,
    attempts: Mutex<HashMap<String, u32>>,
}

impl FakeTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, entity_id: &str, behaviour: Behaviour) -> Self {
        self.script.insert(entity_id.to_string(), behaviour);
        self
    }

    pub fn attempts(&self, entity_id: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(entity_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl FileTransfer for FakeTransfer {
    async fn fetch(
        &self,
        url: &Url,
        partial: &Path,
        progress: ByteProgress<'_>,
    ) -> DownloadResult<TransferOutcome> {
        let file_name = url.path_segments().unwrap().last().unwrap().to_string();
        let entity_id = file_name.split('.').next().unwrap().to_string();
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(entity_id.clone()).or_default();
            *count += 1;
            *count
        };
        tokio::task::yield_now().await;

        let retryable = || {
            DownloadError::Network(NetworkError::Status {
                status: 503,
                url: url.to_string(),
            })
        };
        match self.script.get(&entity_id) {
            Some(Behaviour::FlakyTimes(n)) if attempt <= *n => return Err(retryable()),
            Some(Behaviour::AlwaysRetryable) => return Err(retryable()),
            Some(Behaviour::Forbidden) => {
                return Err(DownloadError::Network(NetworkError::Status {
                    status: 403,
                    url: url.to_string(),
                }))
            }
            _ => {}
        }

        let body = format!("{entity_id} payload");
        tokio::fs::write(partial, &body).await?;
        progress(body.len() as u64);
        Ok(TransferOutcome {
            bytes: body.len() as u64,
            file_name: Some(file_name),
        })
    }
}

/// Records every transition in call order
#[derive(Debug, Default)]
pub struct RecordingProgress {
    pub transitions: Mutex<Vec<(String, TaskStatus)>>,
    pub bytes: Mutex<u64>,
}

impl RecordingProgress {
    pub fn statuses_of(&self, entity_id: &str) -> Vec<TaskStatus> {
        self.transitions
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == entity_id)
            .map(|(_, status)| *status)
            .collect()
    }
}

impl ProgressReporter for RecordingProgress {
    fn on_transition(&self, entity_id: &str, status: TaskStatus) {
        self.transitions
            .lock()
            .unwrap()
            .push((entity_id.to_string(), status));
    }

    fn on_bytes(&self, _entity_id: &str, bytes: u64) {
        *self.bytes.lock().unwrap() += bytes;
    }
}

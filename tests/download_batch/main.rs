//! Integration tests for download batches
//!
//! URLs are resolved by the real catalog client over a stand-in transport;
//! file bodies come from a scripted transfer that can fail on demand.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use url::Url;

use usgs_explorer::app::client::ApiEnvelope;
use usgs_explorer::app::download::{
    BatchReport, ByteProgress, DownloadConfigBuilder, DownloadManager, FileTransfer,
    ProgressMode, TransferOutcome,
};
use usgs_explorer::app::{
    create_shutdown_channel, CatalogClient, ClientConfig, FilterCache, RetryPolicy, Transport,
};
use usgs_explorer::auth::Credentials;
use usgs_explorer::errors::{DownloadError, DownloadResult, NetworkError, NetworkResult};

/// Ids the stand-in service has no product for
const UNAVAILABLE: &[&str] = &["MISSING"];

#[derive(Default)]
struct DownloadServiceStub {
    resolved: Mutex<Vec<String>>,
}

#[async_trait]
impl Transport for DownloadServiceStub {
    async fn post_json(
        &self,
        endpoint: &str,
        payload: &Value,
        _auth_key: Option<&str>,
    ) -> NetworkResult<ApiEnvelope> {
        Ok(match endpoint {
            "login" | "login-token" => ApiEnvelope::ok(json!("stub-key")),
            "logout" => ApiEnvelope::ok(Value::Null),
            "download-options" => {
                let options: Vec<Value> = payload["entityIds"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_str)
                    .map(|id| {
                        json!({
                            "entityId": id,
                            "id": format!("product-{}", id),
                            "available": !UNAVAILABLE.contains(&id),
                            "downloadSystem": "dds",
                        })
                    })
                    .collect();
                ApiEnvelope::ok(Value::Array(options))
            }
            "download-request" => {
                let ready: Vec<Value> = payload["downloads"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(|d| d["entityId"].as_str())
                    .map(|id| {
                        if let Ok(mut resolved) = self.resolved.lock() {
                            resolved.push(id.to_string());
                        }
                        json!({
                            "entityId": id,
                            "downloadId": 1,
                            "url": format!("https://dds.example/files/{}", id),
                        })
                    })
                    .collect();
                ApiEnvelope::ok(json!({ "availableDownloads": ready, "preparingDownloads": [] }))
            }
            other => ApiEnvelope::error("UNKNOWN_ENDPOINT", other),
        })
    }
}

/// Transfer that fails with HTTP 503 a scripted number of times per id
#[derive(Debug, Default)]
struct ScriptedTransfer {
    failures: Mutex<HashMap<String, u32>>,
    attempts: Mutex<HashMap<String, u32>>,
}

impl ScriptedTransfer {
    fn failing(self, entity_id: &str, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(entity_id.to_string(), times);
        self
    }

    fn attempts(&self, entity_id: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(entity_id)
            .copied()
            .unwrap_or(0)
    }

    fn total_attempts(&self) -> u32 {
        self.attempts.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl FileTransfer for ScriptedTransfer {
    async fn fetch(
        &self,
        url: &Url,
        partial: &Path,
        progress: ByteProgress<'_>,
    ) -> DownloadResult<TransferOutcome> {
        let entity_id = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string();
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(entity_id.clone())
            .or_default() += 1;

        let fail = {
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(&entity_id) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            }
        };
        if fail {
            return Err(DownloadError::Network(NetworkError::Status {
                status: 503,
                url: url.to_string(),
            }));
        }

        let body = format!("contents of {}", entity_id);
        tokio::fs::write(partial, &body).await?;
        progress(body.len() as u64);
        Ok(TransferOutcome {
            bytes: body.len() as u64,
            file_name: Some(format!("{}.tgz", entity_id)),
        })
    }
}

fn catalog(stub: &Arc<DownloadServiceStub>) -> Arc<CatalogClient> {
    let config = ClientConfig {
        retry: RetryPolicy::immediate(0),
        retrieve_poll_interval: Duration::ZERO,
        ..ClientConfig::default()
    };
    Arc::new(CatalogClient::with_transport(
        stub.clone(),
        Credentials::with_token("tester", "token").unwrap(),
        config,
        Arc::new(FilterCache::new()),
    ))
}

fn manager(
    catalog: Arc<CatalogClient>,
    transfer: Arc<ScriptedTransfer>,
    max_thread: usize,
) -> DownloadManager {
    let config = DownloadConfigBuilder::new()
        .max_thread(max_thread)
        .max_attempts(3)
        .retry_base_delay(Duration::from_millis(1))
        .retry_max_delay(Duration::from_millis(5))
        .progress(ProgressMode::Silent)
        .url_batch_size(2)
        .build()
        .unwrap();
    DownloadManager::new(catalog, transfer, config).unwrap()
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|id| id.to_string()).collect()
}

fn done_ids(report: &BatchReport) -> Vec<&str> {
    report.done.iter().map(|d| d.entity_id.as_str()).collect()
}

fn failed_ids(report: &BatchReport) -> Vec<&str> {
    report.failed.iter().map(|f| f.entity_id.as_str()).collect()
}

#[tokio::test]
async fn test_batch_resolved_through_catalog() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("B.tgz"), "already here").unwrap();

    let stub = Arc::new(DownloadServiceStub::default());
    let transfer = Arc::new(ScriptedTransfer::default());
    let manager = manager(catalog(&stub), transfer.clone(), 3);

    let report = manager
        .download(
            "declassii",
            &ids(&["A", "B", "A", "  ", "MISSING", "C"]),
            dir.path(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(done_ids(&report), vec!["A", "C"]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].entity_id, "B");
    assert_eq!(failed_ids(&report), vec!["MISSING"]);
    assert!(report.failed[0].reason.contains("No downloadable product"));
    assert!(!report.is_hard_failure());

    // Skipped ids are never resolved or fetched
    assert!(!stub.resolved.lock().unwrap().contains(&"B".to_string()));
    assert_eq!(transfer.attempts("B"), 0);

    assert_eq!(
        std::fs::read_to_string(dir.path().join("A.tgz")).unwrap(),
        "contents of A"
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("B.tgz")).unwrap(),
        "already here"
    );
    let leftovers = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
        .count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_retries_are_counted_exactly() {
    let dir = TempDir::new().unwrap();
    let stub = Arc::new(DownloadServiceStub::default());
    let transfer = Arc::new(
        ScriptedTransfer::default()
            .failing("FLAKY", 2)
            .failing("BROKEN", 10),
    );
    let manager = manager(catalog(&stub), transfer.clone(), 2);

    let report = manager
        .download("declassii", &ids(&["FLAKY", "BROKEN", "FINE"]), dir.path(), None)
        .await
        .unwrap();

    assert_eq!(done_ids(&report), vec!["FLAKY", "FINE"]);
    assert_eq!(report.done[0].attempts, 3);
    assert_eq!(report.done[1].attempts, 1);
    assert_eq!(failed_ids(&report), vec!["BROKEN"]);
    assert_eq!(report.failed[0].attempts, 3);
    assert!(report.failed[0].reason.contains("Maximum attempts (3)"));

    assert_eq!(transfer.attempts("FLAKY"), 3);
    assert_eq!(transfer.attempts("BROKEN"), 3);
    assert_eq!(transfer.total_attempts(), 7);
}

#[tokio::test]
async fn test_worker_count_does_not_change_outcome() {
    let batch = ids(&["S1", "S2", "S3", "MISSING", "S4", "S5", "S6"]);
    let mut outcomes = Vec::new();

    for max_thread in [1, 5] {
        let dir = TempDir::new().unwrap();
        let stub = Arc::new(DownloadServiceStub::default());
        let transfer = Arc::new(
            ScriptedTransfer::default()
                .failing("S2", 1)
                .failing("S5", 3),
        );
        let manager = manager(catalog(&stub), transfer.clone(), max_thread);
        let report = manager
            .download("declassii", &batch, dir.path(), None)
            .await
            .unwrap();

        let attempts: Vec<(String, u32)> = report
            .done
            .iter()
            .map(|d| (d.entity_id.clone(), d.attempts))
            .chain(report.failed.iter().map(|f| (f.entity_id.clone(), f.attempts)))
            .collect();
        outcomes.push((attempts, transfer.total_attempts()));
    }

    assert_eq!(outcomes[0], outcomes[1]);
    // S1..S6 once each, S2 one retry, S5 two retries before giving up
    assert_eq!(outcomes[0].1, 9);
}

#[tokio::test]
async fn test_shutdown_before_start_cancels_every_task() {
    let dir = TempDir::new().unwrap();
    let stub = Arc::new(DownloadServiceStub::default());
    let transfer = Arc::new(ScriptedTransfer::default());
    let manager = manager(catalog(&stub), transfer.clone(), 2);

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    shutdown_tx.send(()).unwrap();

    let report = manager
        .download("declassii", &ids(&["A", "B", "C"]), dir.path(), Some(shutdown_rx))
        .await
        .unwrap();

    assert!(report.done.is_empty());
    assert_eq!(failed_ids(&report), vec!["A", "B", "C"]);
    assert!(report
        .failed
        .iter()
        .all(|f| f.reason.contains("cancelled")));
    assert_eq!(transfer.total_attempts(), 0);
    assert!(report.is_hard_failure());
}

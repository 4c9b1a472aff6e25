//! Download URL resolution
//!
//! Turning entity ids into file URLs takes three endpoints:
//! `download-options` lists the products of each scene, `download-request`
//! orders the chosen products and answers with the ones ready now, and
//! `download-retrieve` is polled for the products still being prepared.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};
use tracing::{debug, info, warn};
use url::Url;

use super::CatalogClient;
use crate::app::models::{AvailableDownload, DownloadOption};
use crate::constants::{download, m2m};
use crate::errors::{CatalogResult, NetworkError};

impl CatalogClient {
    /// Products offered for each entity id
    pub async fn download_options(
        &self,
        dataset: &str,
        entity_ids: &[String],
    ) -> CatalogResult<Vec<DownloadOption>> {
        let payload = json!({ "datasetName": dataset, "entityIds": entity_ids });
        let data = self
            .request_for_dataset(dataset, m2m::endpoints::DOWNLOAD_OPTIONS, &payload)
            .await?;
        if data.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(data).map_err(|e| {
            NetworkError::MalformedResponse {
                endpoint: m2m::endpoints::DOWNLOAD_OPTIONS.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Map entity id to file URL; ids without a downloadable product are absent
    pub async fn download_urls(
        &self,
        dataset: &str,
        entity_ids: &[String],
    ) -> CatalogResult<HashMap<String, Url>> {
        let mut urls = HashMap::new();
        if entity_ids.is_empty() {
            return Ok(urls);
        }

        let products = select_products(self.download_options(dataset, entity_ids).await?);
        if products.is_empty() {
            info!("No downloadable products among {} ids", entity_ids.len());
            return Ok(urls);
        }

        let label = request_label();
        let downloads: Vec<Value> = products
            .iter()
            .map(|p| json!({ "entityId": p.entity_id, "productId": p.product_id }))
            .collect();
        let data = self
            .session
            .authorized_request(
                m2m::endpoints::DOWNLOAD_REQUEST,
                &json!({ "downloads": downloads, "label": label }),
            )
            .await?;

        let wanted: HashSet<&str> = products.iter().map(|p| p.entity_id.as_str()).collect();
        collect_urls(&data, "availableDownloads", &wanted, &mut urls);
        let preparing = data
            .get("preparingDownloads")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        debug!(
            "download-request: {} ready, {} preparing",
            urls.len(),
            preparing
        );

        let mut polls = 0;
        while urls.len() < wanted.len() && polls < self.config.retrieve_max_polls {
            polls += 1;
            tokio::time::sleep(self.config.retrieve_poll_interval).await;

            let data = self
                .session
                .authorized_request(
                    m2m::endpoints::DOWNLOAD_RETRIEVE,
                    &json!({ "label": label }),
                )
                .await?;
            collect_urls(&data, "available", &wanted, &mut urls);

            let requested = data
                .get("requested")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            debug!(
                "download-retrieve poll {}: {}/{} ready",
                polls,
                urls.len(),
                wanted.len()
            );
            if requested == 0 && urls.len() < wanted.len() {
                break;
            }
        }

        if urls.len() < wanted.len() {
            warn!(
                "{} products were not ready after {} polls",
                wanted.len() - urls.len(),
                polls
            );
        }
        Ok(urls)
    }
}

/// First available product per entity id with a supported download system
fn select_products(options: Vec<DownloadOption>) -> Vec<DownloadOption> {
    let mut seen = HashSet::new();
    options
        .into_iter()
        .filter(|o| o.available)
        .filter(|o| {
            o.download_system
                .as_deref()
                .map_or(false, |s| m2m::DOWNLOAD_SYSTEMS.contains(&s))
        })
        .filter(|o| seen.insert(o.entity_id.clone()))
        .collect()
}

fn collect_urls(
    data: &Value,
    field: &str,
    wanted: &HashSet<&str>,
    urls: &mut HashMap<String, Url>,
) {
    let Some(entries) = data.get(field).and_then(Value::as_array) else {
        return;
    };
    for entry in entries {
        let Ok(download) = serde_json::from_value::<AvailableDownload>(entry.clone()) else {
            continue;
        };
        let Some(entity_id) = download.entity_id else {
            continue;
        };
        if !wanted.contains(entity_id.as_str()) || urls.contains_key(&entity_id) {
            continue;
        }
        match Url::parse(&download.url) {
            Ok(url) => {
                urls.insert(entity_id, url);
            }
            Err(e) => warn!("Ignoring invalid download URL for {}: {}", entity_id, e),
        }
    }
}

fn request_label() -> String {
    format!(
        "{}-{}-{:04}",
        download::REQUEST_LABEL_PREFIX,
        chrono::Utc::now().format("%Y%m%d%H%M%S"),
        fastrand::u16(..10_000)
    )
}

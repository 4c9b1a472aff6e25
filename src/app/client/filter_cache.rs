//! Per-process cache of dataset filter schemas

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::app::models::MetadataFilter;

/// Filter definitions keyed by lowercase dataset alias
///
/// Owned by whoever builds the `CatalogClient` so its lifetime is explicit;
/// call `clear` at shutdown.
#[derive(Debug, Default)]
pub struct FilterCache {
    entries: RwLock<HashMap<String, Arc<Vec<MetadataFilter>>>>,
}

impl FilterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, dataset: &str) -> Option<Arc<Vec<MetadataFilter>>> {
        self.entries.read().await.get(&cache_key(dataset)).cloned()
    }

    /// Store a schema, keeping an existing entry if another caller won the race
    pub async fn insert(
        &self,
        dataset: &str,
        filters: Vec<MetadataFilter>,
    ) -> Arc<Vec<MetadataFilter>> {
        let mut entries = self.entries.write().await;
        entries
            .entry(cache_key(dataset))
            .or_insert_with(|| Arc::new(filters))
            .clone()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn cache_key(dataset: &str) -> String {
    dataset.trim().to_lowercase()
}

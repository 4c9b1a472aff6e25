//! M2M catalog client
//!
//! This module is the only gateway to the remote service. It is organized
//! into specialized components:
//! - `config`: HTTP client configuration and building
//! - `http`: the `Transport` seam and its rate-limited reqwest implementation
//! - `session`: login, request signing and single-flight re-authentication
//! - `filter_cache`: per-dataset filter schemas fetched once per process
//! - `download`: resolution of entity ids to file URLs

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::app::filter::SceneFilter;
use crate::app::models::{DatasetSummary, MetadataFilter, MetadataType, ScenePage};
use crate::app::suggest::SuggestionEngine;
use crate::auth::Credentials;
use crate::constants::m2m::{self, endpoints};
use crate::errors::{AuthResult, CatalogError, CatalogResult, NetworkError, NetworkResult};

pub mod config;
pub mod download;
pub mod filter_cache;
pub mod http;
pub mod session;

#[cfg(test)]
pub mod testing;

pub use config::ClientConfig;
pub use filter_cache::FilterCache;
pub use http::{ApiEnvelope, ReqwestTransport, Transport};
pub use session::Session;

/// Catalog operations over an authenticated session
#[derive(Debug)]
pub struct CatalogClient {
    session: Arc<Session>,
    filter_cache: Arc<FilterCache>,
    datasets: OnceCell<Arc<Vec<DatasetSummary>>>,
    suggestions: SuggestionEngine,
    config: ClientConfig,
}

impl CatalogClient {
    /// Creates a client talking to the real service
    ///
    /// No request is made until the first catalog call.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` if the HTTP client or rate limiter cannot be built
    pub fn new(
        config: ClientConfig,
        credentials: Credentials,
        filter_cache: Arc<FilterCache>,
    ) -> NetworkResult<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config)?);
        Ok(Self::with_transport(transport, credentials, config, filter_cache))
    }

    /// Creates a client over any transport
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        credentials: Credentials,
        config: ClientConfig,
        filter_cache: Arc<FilterCache>,
    ) -> Self {
        let session = Arc::new(Session::new(transport, credentials, config.retry));
        Self {
            session,
            filter_cache,
            datasets: OnceCell::new(),
            suggestions: SuggestionEngine::default(),
            config,
        }
    }

    pub fn with_suggestions(mut self, suggestions: SuggestionEngine) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn filter_cache(&self) -> &Arc<FilterCache> {
        &self.filter_cache
    }

    pub fn suggestions(&self) -> SuggestionEngine {
        self.suggestions
    }

    /// Log in eagerly so bad credentials fail before any other work
    pub async fn login(&self) -> AuthResult<()> {
        self.session.login().await.map(|_| ())
    }

    /// End the session and drop cached schemas; safe to call more than once
    pub async fn logout(&self) -> AuthResult<()> {
        self.filter_cache.clear().await;
        self.session.logout().await
    }

    /// Every dataset visible to the account, fetched once
    pub async fn datasets(&self) -> CatalogResult<Arc<Vec<DatasetSummary>>> {
        self.datasets
            .get_or_try_init(|| async {
                let data = self
                    .session
                    .authorized_request(endpoints::DATASET_SEARCH, &json!({}))
                    .await?;
                let datasets: Vec<DatasetSummary> =
                    serde_json::from_value(data).map_err(|e| NetworkError::MalformedResponse {
                        endpoint: endpoints::DATASET_SEARCH.to_string(),
                        reason: e.to_string(),
                    })?;
                info!("Catalog lists {} datasets", datasets.len());
                Ok::<_, CatalogError>(Arc::new(datasets))
            })
            .await
            .cloned()
    }

    /// All dataset aliases in service order
    pub async fn dataset_names(&self) -> CatalogResult<Vec<String>> {
        Ok(self
            .datasets()
            .await?
            .iter()
            .map(|d| d.alias.clone())
            .collect())
    }

    /// Look up a dataset by its exact alias
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::UnknownDataset` with the closest aliases
    pub async fn find_dataset(&self, name: &str) -> CatalogResult<DatasetSummary> {
        let datasets = self.datasets().await?;
        let wanted = name.trim();
        if let Some(found) = datasets.iter().find(|d| d.alias == wanted) {
            return Ok(found.clone());
        }
        Err(self.unknown_dataset(wanted, &datasets))
    }

    /// Filter schema of a dataset, served from the cache after the first call
    pub async fn filters_for(&self, dataset: &str) -> CatalogResult<Arc<Vec<MetadataFilter>>> {
        if let Some(cached) = self.filter_cache.get(dataset).await {
            return Ok(cached);
        }

        let data = self
            .request_for_dataset(
                dataset,
                endpoints::DATASET_FILTERS,
                &json!({ "datasetName": dataset }),
            )
            .await?;
        let entries = match data {
            Value::Array(entries) => entries,
            Value::Null => Vec::new(),
            _ => {
                return Err(NetworkError::MalformedResponse {
                    endpoint: endpoints::DATASET_FILTERS.to_string(),
                    reason: "expected a list of filters".to_string(),
                }
                .into())
            }
        };
        let filters = entries
            .into_iter()
            .map(MetadataFilter::from_wire)
            .collect::<NetworkResult<Vec<_>>>()?;

        debug!("Fetched {} filters for {}", filters.len(), dataset);
        Ok(self.filter_cache.insert(dataset, filters).await)
    }

    /// One page of `scene-search`; `starting_number` is 1-based
    pub async fn search(
        &self,
        dataset: &str,
        scene_filter: &SceneFilter,
        metadata_type: MetadataType,
        starting_number: u64,
        page_size: u32,
    ) -> CatalogResult<ScenePage> {
        let page_size = page_size.clamp(1, m2m::MAX_PAGE_SIZE);
        let payload = json!({
            "datasetName": dataset,
            "sceneFilter": scene_filter,
            "maxResults": page_size,
            "startingNumber": starting_number.max(1),
            "metadataType": metadata_type.to_wire(),
        });

        let data = self
            .request_for_dataset(dataset, endpoints::SCENE_SEARCH, &payload)
            .await?;
        let page = ScenePage::from_wire(dataset, data)?;
        debug!(
            "scene-search {} from {}: {} records of {}",
            dataset,
            starting_number,
            page.records.len(),
            page.total_hits
        );
        Ok(page)
    }

    /// Signed request that turns the service's invalid-dataset code into suggestions
    async fn request_for_dataset(
        &self,
        dataset: &str,
        endpoint: &str,
        payload: &Value,
    ) -> CatalogResult<Value> {
        match self.session.authorized_request(endpoint, payload).await {
            Err(CatalogError::Network(NetworkError::Service { code, message }))
                if code == m2m::DATASET_INVALID_CODE =>
            {
                debug!("{} rejected dataset {}: {}", endpoint, dataset, message);
                let datasets = self.datasets().await?;
                Err(self.unknown_dataset(dataset, &datasets))
            }
            other => other,
        }
    }

    fn unknown_dataset(&self, name: &str, datasets: &[DatasetSummary]) -> CatalogError {
        let aliases: Vec<&str> = datasets.iter().map(|d| d.alias.as_str()).collect();
        CatalogError::UnknownDataset {
            name: name.to_string(),
            suggestions: self.suggestions.suggest(name, &aliases),
        }
    }
}

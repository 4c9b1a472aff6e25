//! Entity id to file URL resolution

use std::collections::HashMap;

use async_trait::async_trait;
use url::Url;

use crate::app::client::CatalogClient;
use crate::errors::CatalogResult;

/// Turns a batch of entity ids into download URLs
///
/// Ids with no downloadable product are left out of the map rather than
/// reported as errors.
#[async_trait]
pub trait UrlResolver: Send + Sync {
    async fn resolve(
        &self,
        dataset: &str,
        entity_ids: &[String],
    ) -> CatalogResult<HashMap<String, Url>>;
}

#[async_trait]
impl UrlResolver for CatalogClient {
    async fn resolve(
        &self,
        dataset: &str,
        entity_ids: &[String],
    ) -> CatalogResult<HashMap<String, Url>> {
        self.download_urls(dataset, entity_ids).await
    }
}

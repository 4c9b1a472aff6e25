//! Lazy enumeration of scene-search results
//!
//! `scene-search` returns at most one window of results per call. The
//! paginator turns the repeated calls into a stream that:
//! - advances `startingNumber` by the number of records actually returned
//! - asks only for the remainder of the limit on the final request
//! - stops on an empty page, on the limit, or once total hits are consumed
//!
//! Nothing is requested until the stream is polled, and dropping it stops
//! further requests. Each call to `stream` starts over from the first record.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::{debug, warn};

use crate::app::client::CatalogClient;
use crate::app::filter::SceneFilter;
use crate::app::models::{MetadataType, ScenePage, SceneResult};
use crate::constants::m2m;
use crate::errors::{CatalogError, CatalogResult, NetworkError};

/// Anything that can answer one scene-search page
#[async_trait]
pub trait SceneSource: Send + Sync {
    async fn scene_page(
        &self,
        dataset: &str,
        filter: &SceneFilter,
        metadata_type: MetadataType,
        starting_number: u64,
        page_size: u32,
    ) -> CatalogResult<ScenePage>;
}

#[async_trait]
impl SceneSource for CatalogClient {
    async fn scene_page(
        &self,
        dataset: &str,
        filter: &SceneFilter,
        metadata_type: MetadataType,
        starting_number: u64,
        page_size: u32,
    ) -> CatalogResult<ScenePage> {
        self.search(dataset, filter, metadata_type, starting_number, page_size)
            .await
    }
}

/// What to enumerate
#[derive(Debug, Clone, PartialEq)]
pub struct SceneQuery {
    pub dataset: String,
    pub filter: SceneFilter,
    pub metadata_type: MetadataType,
    /// Stop after this many records
    pub limit: Option<usize>,
    pub page_size: u32,
}

impl SceneQuery {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            filter: SceneFilter::default(),
            metadata_type: MetadataType::None,
            limit: None,
            page_size: m2m::DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_filter(mut self, filter: SceneFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_metadata_type(mut self, metadata_type: MetadataType) -> Self {
        self.metadata_type = metadata_type;
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Page size, clamped to what the service accepts
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, m2m::MAX_PAGE_SIZE);
        self
    }
}

/// Reported after each page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageProgress {
    /// Records yielded so far
    pub fetched: usize,
    /// Records the enumeration will yield in total, as far as currently known
    pub expected: u64,
}

type PageCallback = Arc<dyn Fn(PageProgress) + Send + Sync>;

/// Restartable stream of scenes for one query
#[derive(Clone)]
pub struct ScenePaginator {
    source: Arc<dyn SceneSource>,
    query: Arc<SceneQuery>,
    on_page: Option<PageCallback>,
}

struct Cursor {
    source: Arc<dyn SceneSource>,
    query: Arc<SceneQuery>,
    on_page: Option<PageCallback>,
    next_record: u64,
    consumed: u64,
    yielded: usize,
    requests: usize,
    finished: bool,
}

impl ScenePaginator {
    pub fn new(source: Arc<dyn SceneSource>, query: SceneQuery) -> Self {
        Self {
            source,
            query: Arc::new(query),
            on_page: None,
        }
    }

    /// Invoke `callback` after every page, e.g. to drive a progress bar
    pub fn on_page<F>(mut self, callback: F) -> Self
    where
        F: Fn(PageProgress) + Send + Sync + 'static,
    {
        self.on_page = Some(Arc::new(callback));
        self
    }

    pub fn query(&self) -> &SceneQuery {
        &self.query
    }

    /// Pages of scenes in service order
    pub fn pages(&self) -> BoxStream<'static, CatalogResult<Vec<SceneResult>>> {
        let cursor = Cursor {
            source: self.source.clone(),
            query: self.query.clone(),
            on_page: self.on_page.clone(),
            next_record: 1,
            consumed: 0,
            yielded: 0,
            requests: 0,
            finished: false,
        };

        stream::try_unfold(cursor, |mut cursor| async move {
            if cursor.finished {
                return Ok(None);
            }

            let remaining = cursor
                .query
                .limit
                .map(|limit| limit.saturating_sub(cursor.yielded));
            if remaining == Some(0) {
                return Ok(None);
            }

            if cursor.requests >= m2m::MAX_SEARCH_PAGES {
                return Err(CatalogError::from(NetworkError::MalformedResponse {
                    endpoint: m2m::endpoints::SCENE_SEARCH.to_string(),
                    reason: format!(
                        "pagination did not finish after {} pages",
                        m2m::MAX_SEARCH_PAGES
                    ),
                }));
            }
            cursor.requests += 1;

            let page_size = match remaining {
                Some(remaining) => remaining.min(cursor.query.page_size as usize) as u32,
                None => cursor.query.page_size,
            };

            let page = cursor
                .source
                .scene_page(
                    &cursor.query.dataset,
                    &cursor.query.filter,
                    cursor.query.metadata_type,
                    cursor.next_record,
                    page_size,
                )
                .await?;

            let returned = page.records.len();
            if returned == 0 {
                debug!("Empty page at record {}, enumeration done", cursor.next_record);
                return Ok(None);
            }

            let mut records = page.records;
            if let Some(remaining) = remaining {
                if returned > remaining {
                    warn!(
                        "Service returned {} records for a page of {}, truncating",
                        returned, remaining
                    );
                    records.truncate(remaining);
                }
            }

            cursor.yielded += records.len();
            cursor.consumed += returned as u64;
            cursor.next_record += returned as u64;

            let limit_reached = cursor
                .query
                .limit
                .map_or(false, |limit| cursor.yielded >= limit);
            if limit_reached || cursor.consumed >= page.total_hits {
                cursor.finished = true;
            }

            if let Some(callback) = &cursor.on_page {
                let expected = match cursor.query.limit {
                    Some(limit) => page.total_hits.min(limit as u64),
                    None => page.total_hits,
                };
                callback(PageProgress {
                    fetched: cursor.yielded,
                    expected,
                });
            }

            Ok::<_, CatalogError>(Some((records, cursor)))
        })
        .boxed()
    }

    /// Scenes one at a time, in service order
    pub fn stream(&self) -> BoxStream<'static, CatalogResult<SceneResult>> {
        self.pages()
            .map_ok(|page| stream::iter(page.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }

    /// Drain the whole enumeration into memory
    pub async fn collect_all(&self) -> CatalogResult<Vec<SceneResult>> {
        let pages: Vec<Vec<SceneResult>> = self.pages().try_collect().await?;
        Ok(pages.into_iter().flatten().collect())
    }
}

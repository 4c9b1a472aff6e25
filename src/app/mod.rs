//! Core application logic for USGS Explorer
//!
//! This module contains the catalog client, the filter expression pipeline,
//! scene pagination, concurrent downloads and the result writers.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use usgs_explorer::app::{
//!     compile_expression, CatalogClient, ClientConfig, CompileOutcome, FilterCache, SceneFilter,
//!     ScenePaginator, SceneQuery,
//! };
//! use usgs_explorer::auth::Credentials;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(CatalogClient::new(
//!     ClientConfig::default(),
//!     Credentials::from_env()?,
//!     Arc::new(FilterCache::new()),
//! )?);
//!
//! // Resolve a metadata filter against the dataset schema
//! let schema = client.filters_for("declassii").await?;
//! let mut filter = SceneFilter::new();
//! if let CompileOutcome::Query(query) = compile_expression("camera=L", &schema)? {
//!     filter = filter.with_metadata(query);
//! }
//!
//! // Enumerate every matching scene lazily
//! let paginator = ScenePaginator::new(client.clone(), SceneQuery::new("declassii").with_filter(filter));
//! let mut scenes = paginator.stream();
//! while let Some(scene) = scenes.next().await {
//!     println!("{}", scene?.entity_id);
//! }
//!
//! client.logout().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod download;
pub mod filter;
pub mod idlist;
pub mod models;
pub mod output;
pub mod retry;
pub mod search;
pub mod signals;
pub mod suggest;

// Re-export main public API
pub use client::{CatalogClient, ClientConfig, FilterCache, Session, Transport};
pub use download::{BatchReport, DownloadConfig, DownloadManager, HttpTransfer, ProgressMode};
pub use filter::{compile_expression, CompileOutcome, CompiledQuery, FilterCompiler, SceneFilter};
pub use idlist::IdList;
pub use models::{DatasetSummary, MetadataFilter, MetadataType, SceneResult};
pub use output::{write_scenes, OutputFormat};
pub use retry::RetryPolicy;
pub use search::{SceneQuery, ScenePaginator, SceneSource};
pub use signals::{create_shutdown_channel, SignalHandler};
pub use suggest::SuggestionEngine;

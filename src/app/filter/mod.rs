//! Metadata filter expressions and scene filters
//!
//! A filter expression like `camera=L & camera_resol=6 | DOWNLOAD_AVAILABLE=Y`
//! goes through three stages:
//! - `parser`: text to a boolean [`FilterNode`] tree
//! - `compiler`: tree plus dataset schema to the service's [`CompiledQuery`]
//! - `scene`: the compiled query combined with spatial, temporal and cloud
//!   constraints into the [`SceneFilter`] payload
//!
//! # Examples
//!
//! ```rust
//! use usgs_explorer::app::filter::{compile_expression, CompileOutcome};
//! use usgs_explorer::app::models::{FilterKind, MetadataFilter};
//!
//! let schema = vec![MetadataFilter {
//!     id: "5e839ff7d71d4811".to_string(),
//!     label: "Entity ID".to_string(),
//!     sql_name: "ENTITY_ID".to_string(),
//!     kind: FilterKind::Value,
//!     values: vec![],
//! }];
//!
//! let outcome = compile_expression("entity_id=DZB1216", &schema).unwrap();
//! assert!(matches!(outcome, CompileOutcome::Query(_)));
//! ```

pub mod ast;
pub mod compiler;
pub mod parser;
pub mod scene;

pub use ast::{FilterNode, Leaf, Operator};
pub use compiler::{CompileOutcome, CompiledQuery, FilterCompiler, Operand, ValueListing};
pub use parser::parse;
pub use scene::{AcquisitionFilter, CloudCoverFilter, Coordinate, SceneFilter, SpatialFilter};

use crate::app::models::MetadataFilter;
use crate::errors::FilterResult;

/// Parse and compile `expression` against a dataset schema in one step
pub fn compile_expression(
    expression: &str,
    schema: &[MetadataFilter],
) -> FilterResult<CompileOutcome> {
    let node = parse(expression)?;
    FilterCompiler::new(schema).compile(&node)
}

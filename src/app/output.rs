//! Search result writers
//!
//! The output format follows the file extension: `.txt` writes an id list
//! with a dataset header, `.json` the records as the service returned them
//! and `.geojson` a FeatureCollection of scene footprints. `.gpkg` and `.shp`
//! are recognized but not written.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::app::idlist::IdList;
use crate::app::models::{MetadataType, SceneResult};
use crate::errors::{OutputError, OutputResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Txt,
    Json,
    GeoJson,
    GeoPackage,
    Shapefile,
}

impl OutputFormat {
    /// Format named by the extension of `path`
    pub fn from_path(path: &Path) -> OutputResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        match extension.as_deref() {
            Some("txt") => Ok(OutputFormat::Txt),
            Some("json") => Ok(OutputFormat::Json),
            Some("geojson") => Ok(OutputFormat::GeoJson),
            Some("gpkg") => Ok(OutputFormat::GeoPackage),
            Some("shp") => Ok(OutputFormat::Shapefile),
            _ => Err(OutputError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    pub fn is_writable(self) -> bool {
        matches!(
            self,
            OutputFormat::Txt | OutputFormat::Json | OutputFormat::GeoJson
        )
    }

    /// Metadata the search must request for this format
    pub fn metadata_type(self) -> MetadataType {
        match self {
            OutputFormat::Txt => MetadataType::None,
            _ => MetadataType::Full,
        }
    }
}

/// Check the path names a format this crate writes, before any search runs
pub fn validate_output_path(path: &Path) -> OutputResult<OutputFormat> {
    let format = OutputFormat::from_path(path)?;
    if !format.is_writable() {
        return Err(OutputError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }
    Ok(format)
}

/// Write `scenes` to `path` in the format its extension names
pub fn write_scenes(path: &Path, dataset: &str, scenes: &[SceneResult]) -> OutputResult<()> {
    let format = OutputFormat::from_path(path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    match format {
        OutputFormat::Txt => {
            let ids = scenes.iter().map(|s| s.entity_id.clone()).collect();
            IdList::new(Some(dataset.to_string()), ids).write(path)?;
        }
        OutputFormat::Json => {
            let records: Vec<Value> = scenes.iter().map(scene_record).collect();
            write_json(path, &Value::Array(records))?;
        }
        OutputFormat::GeoJson => {
            write_json(path, &feature_collection(scenes))?;
        }
        OutputFormat::GeoPackage | OutputFormat::Shapefile => {
            return Err(OutputError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    }

    info!("Wrote {} scenes to {}", scenes.len(), path.display());
    Ok(())
}

fn write_json(path: &Path, value: &Value) -> OutputResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// The record in service shape: ids and footprint back alongside the metadata
pub fn scene_record(scene: &SceneResult) -> Value {
    let mut record = Map::new();
    record.insert("entityId".to_string(), json!(scene.entity_id));
    if let Some(display_id) = &scene.display_id {
        record.insert("displayId".to_string(), json!(display_id));
    }
    for (key, value) in &scene.metadata {
        record.insert(key.clone(), value.clone());
    }
    if let Some(geometry) = &scene.geometry {
        record.insert("spatialCoverage".to_string(), geometry.clone());
    }
    Value::Object(record)
}

/// Scenes with a footprint as GeoJSON features; the rest are left out
pub fn feature_collection(scenes: &[SceneResult]) -> Value {
    let features: Vec<Value> = scenes
        .iter()
        .filter_map(|scene| {
            let geometry = scene.geometry.as_ref()?;
            Some(json!({
                "type": "Feature",
                "geometry": geometry,
                "properties": feature_properties(scene),
            }))
        })
        .collect();
    if features.len() < scenes.len() {
        debug!(
            "{} scenes have no spatial coverage and were left out",
            scenes.len() - features.len()
        );
    }
    json!({ "type": "FeatureCollection", "features": features })
}

/// Scalar record fields, `metadata` entries flattened by field name, and the first browse URL
fn feature_properties(scene: &SceneResult) -> Value {
    let mut properties = Map::new();
    properties.insert("entityId".to_string(), json!(scene.entity_id));
    properties.insert("displayId".to_string(), json!(scene.display_id));
    properties.insert("dataset".to_string(), json!(scene.dataset));

    for (key, value) in &scene.metadata {
        match (key.as_str(), value) {
            ("metadata", Value::Array(fields)) => {
                for field in fields {
                    if let Some(name) = field.get("fieldName").and_then(Value::as_str) {
                        let value = field.get("value").cloned().unwrap_or(Value::Null);
                        properties.insert(name.to_string(), value);
                    }
                }
            }
            ("browse", Value::Array(browse)) => {
                let url = browse
                    .first()
                    .and_then(|b| b.get("browsePath"))
                    .cloned()
                    .unwrap_or(Value::Null);
                properties.insert("browse_url".to_string(), url);
            }
            (_, Value::Array(_) | Value::Object(_)) => {}
            (_, scalar) => {
                properties.insert(key.clone(), scalar.clone());
            }
        }
    }
    Value::Object(properties)
}

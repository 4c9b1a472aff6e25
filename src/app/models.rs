//! Data models for USGS Explorer
//!
//! This module defines the records exchanged with the M2M catalog: datasets,
//! metadata filter definitions, scene search pages and download options.
//! Wire shapes are decoded here and turned into the crate's own types so the
//! rest of the code never touches raw JSON field names.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{NetworkError, NetworkResult};

/// Entry of the `dataset-search` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    /// Stable alias used in every other call (e.g. `landsat_tm_c2_l1`)
    #[serde(rename = "datasetAlias")]
    pub alias: String,
    #[serde(default)]
    pub collection_name: Option<String>,
}

/// How a metadata filter constrains its field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterKind {
    /// Free-form value matched with `like`
    Value,
    /// Ordered field accepting `lo..hi`
    Range,
    /// Enumerated values
    Select,
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterKind::Value => "value",
            FilterKind::Range => "range",
            FilterKind::Select => "select",
        };
        write!(f, "{}", name)
    }
}

/// One allowed value of a `Select` filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterValue {
    pub id: String,
    pub label: String,
}

/// Dataset-specific metadata filter definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub id: String,
    pub label: String,
    /// Column name, the first token of the service's `searchSql`
    pub sql_name: String,
    pub kind: FilterKind,
    /// Allowed values in service order, empty unless `kind` is `Select`
    pub values: Vec<FilterValue>,
}

impl MetadataFilter {
    /// Decode one entry of the `dataset-filters` response
    pub fn from_wire(value: Value) -> NetworkResult<Self> {
        let raw: RawFilter =
            serde_json::from_value(value).map_err(|e| NetworkError::MalformedResponse {
                endpoint: "dataset-filters".to_string(),
                reason: e.to_string(),
            })?;
        Ok(raw.into())
    }

    /// Value ids in service order
    pub fn value_ids(&self) -> Vec<String> {
        self.values.iter().map(|v| v.id.clone()).collect()
    }

    /// `id (label)` strings used in listings and error messages
    pub fn value_descriptions(&self) -> Vec<String> {
        self.values
            .iter()
            .map(|v| format!("{} ({})", v.id, v.label))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFilter {
    id: Value,
    #[serde(default)]
    field_label: String,
    #[serde(default)]
    search_sql: String,
    #[serde(default)]
    field_config: Option<RawFieldConfig>,
    #[serde(default)]
    value_list: Option<RawValueList>,
}

#[derive(Debug, Deserialize)]
struct RawFieldConfig {
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

/// The service sends enumerations either as `[{value, label}]` or as `{value: label}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValueList {
    List(Vec<RawValue>),
    Map(BTreeMap<String, Value>),
}

#[derive(Debug, Deserialize)]
struct RawValue {
    value: Value,
    #[serde(default)]
    label: Option<String>,
}

impl From<RawFilter> for MetadataFilter {
    fn from(raw: RawFilter) -> Self {
        let values: Vec<FilterValue> = match raw.value_list {
            Some(RawValueList::List(list)) => list
                .into_iter()
                .map(|v| {
                    let id = scalar_to_string(&v.value);
                    let label = v.label.unwrap_or_else(|| id.clone());
                    FilterValue { id, label }
                })
                .collect(),
            Some(RawValueList::Map(map)) => map
                .into_iter()
                .map(|(id, label)| FilterValue {
                    label: scalar_to_string(&label),
                    id,
                })
                .collect(),
            None => Vec::new(),
        };

        let config_type = raw
            .field_config
            .and_then(|c| c.kind)
            .unwrap_or_default()
            .to_ascii_lowercase();
        let kind = if config_type.contains("select") && !values.is_empty() {
            FilterKind::Select
        } else if matches!(
            config_type.as_str(),
            "date" | "daterange" | "between" | "range" | "numeric_range"
        ) {
            FilterKind::Range
        } else if !values.is_empty() {
            FilterKind::Select
        } else {
            FilterKind::Value
        };

        let sql_name = raw
            .search_sql
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();

        Self {
            id: scalar_to_string(&raw.id),
            label: raw.field_label.trim().to_string(),
            sql_name,
            kind,
            values,
        }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// How much metadata `scene-search` attaches to each record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataType {
    Full,
    Summary,
    /// Ids only, the cheapest page
    #[default]
    None,
}

impl MetadataType {
    /// Value of the `metadataType` request field
    pub fn to_wire(self) -> Value {
        match self {
            MetadataType::Full => Value::String("full".to_string()),
            MetadataType::Summary => Value::String("summary".to_string()),
            MetadataType::None => Value::Null,
        }
    }
}

/// One scene returned by `scene-search`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneResult {
    pub entity_id: String,
    pub display_id: Option<String>,
    pub dataset: String,
    /// Record fields other than the ids and geometry, in service order
    pub metadata: Map<String, Value>,
    /// GeoJSON geometry of the scene footprint
    pub geometry: Option<Value>,
}

impl SceneResult {
    /// Decode a `scene-search` result record
    pub fn from_record(dataset: &str, record: Value) -> NetworkResult<Self> {
        let Value::Object(mut fields) = record else {
            return Err(NetworkError::MalformedResponse {
                endpoint: "scene-search".to_string(),
                reason: "scene record is not an object".to_string(),
            });
        };

        let entity_id = match fields.remove("entityId") {
            Some(Value::String(id)) if !id.is_empty() => id,
            Some(other) if !other.is_null() => scalar_to_string(&other),
            _ => {
                return Err(NetworkError::MalformedResponse {
                    endpoint: "scene-search".to_string(),
                    reason: "scene record has no entityId".to_string(),
                })
            }
        };
        let display_id = fields
            .remove("displayId")
            .filter(|v| !v.is_null())
            .map(|v| scalar_to_string(&v));
        let geometry = fields.remove("spatialCoverage").filter(|v| !v.is_null());

        Ok(Self {
            entity_id,
            display_id,
            dataset: dataset.to_string(),
            metadata: fields,
            geometry,
        })
    }
}

/// One `scene-search` response
#[derive(Debug, Clone, PartialEq)]
pub struct ScenePage {
    pub records: Vec<SceneResult>,
    pub records_returned: u64,
    pub total_hits: u64,
    pub starting_number: u64,
    pub next_record: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScenePage {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    records_returned: Option<u64>,
    #[serde(default)]
    total_hits: u64,
    #[serde(default)]
    starting_number: Option<u64>,
    #[serde(default)]
    next_record: Option<u64>,
}

impl ScenePage {
    /// Decode the `data` part of a `scene-search` envelope
    pub fn from_wire(dataset: &str, data: Value) -> NetworkResult<Self> {
        let raw: RawScenePage =
            serde_json::from_value(data).map_err(|e| NetworkError::MalformedResponse {
                endpoint: "scene-search".to_string(),
                reason: e.to_string(),
            })?;
        let records = raw
            .results
            .into_iter()
            .map(|record| SceneResult::from_record(dataset, record))
            .collect::<NetworkResult<Vec<_>>>()?;

        Ok(Self {
            records_returned: raw.records_returned.unwrap_or(records.len() as u64),
            total_hits: raw.total_hits,
            starting_number: raw.starting_number.unwrap_or(1),
            next_record: raw.next_record,
            records,
        })
    }
}

/// Entry of the `download-options` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOption {
    pub entity_id: String,
    #[serde(rename = "id")]
    pub product_id: String,
    #[serde(default)]
    pub display_id: Option<String>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub download_system: Option<String>,
}

/// Entry of `availableDownloads` (download-request) or `available` (download-retrieve)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableDownload {
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub download_id: Option<Value>,
    pub url: String,
}

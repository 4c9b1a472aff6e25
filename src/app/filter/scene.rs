//! Scene filter sent with every `scene-search` call

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::compiler::CompiledQuery;
use crate::errors::{FilterError, FilterResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub longitude: f64,
    pub latitude: f64,
}

/// Minimum bounding rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialFilter {
    filter_type: MbrTag,
    pub lower_left: Coordinate,
    pub upper_right: Coordinate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum MbrTag {
    #[serde(rename = "mbr")]
    Mbr,
}

impl SpatialFilter {
    /// Rectangle from `(xmin, ymin, xmax, ymax)` in decimal degrees
    pub fn bbox(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            filter_type: MbrTag::Mbr,
            lower_left: Coordinate {
                longitude: xmin,
                latitude: ymin,
            },
            upper_right: Coordinate {
                longitude: xmax,
                latitude: ymax,
            },
        }
    }

    /// Zero-extent rectangle around a point
    pub fn point(longitude: f64, latitude: f64) -> Self {
        Self::bbox(longitude, latitude, longitude, latitude)
    }
}

/// Acquisition date interval, both ends `YYYY-MM-DD`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionFilter {
    pub start: String,
    pub end: String,
}

impl AcquisitionFilter {
    pub fn new(start: &str, end: &str) -> FilterResult<Self> {
        let start_date = parse_date("start", start)?;
        let end_date = parse_date("end", end)?;
        if start_date > end_date {
            return Err(FilterError::InvalidSceneFilter {
                reason: format!("start date {} is after end date {}", start, end),
            });
        }
        Ok(Self {
            start: start.trim().to_string(),
            end: end.trim().to_string(),
        })
    }
}

fn parse_date(which: &str, raw: &str) -> FilterResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        FilterError::InvalidSceneFilter {
            reason: format!(
                "the {} date '{}' must be formatted like '2010-01-01'",
                which, raw
            ),
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudCoverFilter {
    pub min: u8,
    pub max: u8,
    pub include_unknown: bool,
}

impl CloudCoverFilter {
    /// Scenes with at most `max` percent cloud cover
    pub fn max(max: u8) -> FilterResult<Self> {
        if max > 100 {
            return Err(FilterError::InvalidSceneFilter {
                reason: format!("cloud cover must be between 0 and 100, got {}", max),
            });
        }
        Ok(Self {
            min: 0,
            max,
            include_unknown: false,
        })
    }
}

/// Complete `sceneFilter` payload; absent parts are omitted from the request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spatial_filter: Option<SpatialFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquisition_filter: Option<AcquisitionFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_cover_filter: Option<CloudCoverFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_filter: Option<CompiledQuery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seasonal_filter: Option<Vec<u8>>,
}

impl SceneFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_spatial(mut self, spatial: SpatialFilter) -> Self {
        self.spatial_filter = Some(spatial);
        self
    }

    pub fn with_acquisition(mut self, acquisition: AcquisitionFilter) -> Self {
        self.acquisition_filter = Some(acquisition);
        self
    }

    pub fn with_cloud_cover(mut self, cloud_cover: CloudCoverFilter) -> Self {
        self.cloud_cover_filter = Some(cloud_cover);
        self
    }

    pub fn with_metadata(mut self, metadata: CompiledQuery) -> Self {
        self.metadata_filter = Some(metadata);
        self
    }

    /// Restrict to acquisition months, 1-12
    pub fn with_months(mut self, months: Vec<u8>) -> FilterResult<Self> {
        if let Some(bad) = months.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(FilterError::InvalidSceneFilter {
                reason: format!("month {} is not between 1 and 12", bad),
            });
        }
        if !months.is_empty() {
            self.seasonal_filter = Some(months);
        }
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

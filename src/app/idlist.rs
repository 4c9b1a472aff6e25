//! Entity id list files
//!
//! One id per line, blank lines ignored, anything after `#` is a comment.
//! The first line may name the dataset: `#dataset=declassii`.

use std::fmt::Write as _;
use std::path::Path;

use tracing::debug;

use crate::constants::files;
use crate::errors::{OutputError, OutputResult};

/// Ids read from a list file, plus the dataset its header names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdList {
    pub dataset: Option<String>,
    pub entity_ids: Vec<String>,
}

impl IdList {
    pub fn new(dataset: Option<String>, entity_ids: Vec<String>) -> Self {
        Self {
            dataset,
            entity_ids,
        }
    }

    pub fn parse(content: &str) -> Self {
        let mut lines = content.lines().peekable();
        let dataset = lines.peek().and_then(|first| dataset_header(first));

        let entity_ids = lines
            .map(|line| line.split('#').next().unwrap_or_default().trim())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            dataset,
            entity_ids,
        }
    }

    pub fn read(path: &Path) -> OutputResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let list = Self::parse(&content);
        debug!(
            "Read {} ids from {} (dataset header: {:?})",
            list.entity_ids.len(),
            path.display(),
            list.dataset
        );
        Ok(list)
    }

    /// Dataset to use: the explicit one wins over the file header
    ///
    /// # Errors
    ///
    /// Returns `OutputError::MissingDataset` if neither is present
    pub fn dataset_or(&self, explicit: Option<&str>, path: &Path) -> OutputResult<String> {
        explicit
            .map(str::to_string)
            .or_else(|| self.dataset.clone())
            .ok_or_else(|| OutputError::MissingDataset {
                path: path.to_path_buf(),
            })
    }

    pub fn to_text(&self) -> String {
        let mut text = String::new();
        if let Some(dataset) = &self.dataset {
            let _ = writeln!(text, "{}{}", files::DATASET_HEADER, dataset);
        }
        for id in &self.entity_ids {
            text.push_str(id);
            text.push('\n');
        }
        text
    }

    pub fn write(&self, path: &Path) -> OutputResult<()> {
        std::fs::write(path, self.to_text())?;
        Ok(())
    }
}

/// `#dataset=<name>` with any spacing; other comment lines are not headers
fn dataset_header(line: &str) -> Option<String> {
    let comment = line.trim().strip_prefix('#')?;
    let (key, value) = comment.split_once('=')?;
    if !key.trim().eq_ignore_ascii_case("dataset") {
        return None;
    }
    Some(value.trim().to_string()).filter(|v| !v.is_empty())
}

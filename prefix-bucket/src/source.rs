//! File-backed [`RecordSource`]: a JSON array of banner lookup records.
//!
//! The file is re-read on every query, so each run sees the current export.

use async_trait::async_trait;
use prefix_bucket_core::contract::{BannerRecord, RecordSource, SourceError};
use std::path::PathBuf;
use tracing::{debug, error};

pub struct JsonFileRecordSource {
    path: PathBuf,
}

impl JsonFileRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecordSource for JsonFileRecordSource {
    async fn records_for_prefix(&self, prefix: &str) -> Result<Vec<BannerRecord>, SourceError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            error!(path = %self.path.display(), error = %e, "Failed to read records file");
            e
        })?;
        let records: Vec<BannerRecord> = serde_json::from_str(&content).map_err(|e| {
            error!(path = %self.path.display(), error = %e, "Failed to parse records file");
            e
        })?;
        let matching: Vec<BannerRecord> = records
            .into_iter()
            .filter(|r| r.sha2_base16.starts_with(prefix))
            .collect();
        debug!(prefix, matching = matching.len(), "Filtered records by prefix");
        Ok(matching)
    }
}

//! JSON file mirror
//!
//! Writes one pretty-printed `<issue_id>_<YYYYmmdd_HHMMSS>.json` file per
//! crawled issue. Every write creates its own file, so concurrent workers
//! never share a file handle.

use crate::storage::StorageResult;
use crate::tracker::IssueRecord;
use chrono::Utc;
use std::path::{Path, PathBuf};

/// Secondary store writing issue records as JSON files
#[derive(Debug, Clone)]
pub struct JsonMirror {
    dir: PathBuf,
}

impl JsonMirror {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `record` and returns the path of the new file
    pub async fn write(&self, record: &IssueRecord) -> StorageResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let safe_id: String = record
            .issue_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let path = self.dir.join(format!("{}_{}.json", safe_id, timestamp));

        let json = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&path, json).await?;

        tracing::debug!(issue_id = %record.issue_id, "Mirrored issue to {}", path.display());
        Ok(path)
    }
}

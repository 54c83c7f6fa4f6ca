//! History repository.
//!
//! Provides save / list / get over `<dir>/<type>.json` files.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{HistoryError, Result};

/// Kind of operation a history record describes. One file per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    MultiEngine,
    ArxivSearch,
    LatestPapers,
}

impl RecordType {
    pub const ALL: [RecordType; 3] = [
        RecordType::MultiEngine,
        RecordType::ArxivSearch,
        RecordType::LatestPapers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::MultiEngine  => "multi_engine",
            RecordType::ArxivSearch  => "arxiv_search",
            RecordType::LatestPapers => "latest_papers",
        }
    }
}

impl FromStr for RecordType {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self> {
        RecordType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| HistoryError::UnknownType(s.to_string()))
    }
}

/// One persisted outcome. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub timestamp: DateTime<Utc>,
    pub params: serde_json::Value,
    pub result_summary: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub papers: Option<serde_json::Value>,
}

/// JSON-on-disk history store.
///
/// Writes are serialised through an in-process lock and land via a temp file
/// plus rename, so a reader never sees a half-written file.
pub struct HistoryStore {
    dir: PathBuf,
    max_per_type: usize,
    write_lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>, max_per_type: usize) -> Self {
        Self {
            dir: dir.into(),
            max_per_type: max_per_type.max(1),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, record_type: RecordType) -> PathBuf {
        self.dir.join(format!("{}.json", record_type.as_str()))
    }

    /// Prepend a new record and return its id.
    pub async fn save(
        &self,
        record_type: RecordType,
        params: serde_json::Value,
        result_summary: serde_json::Value,
        papers: Option<serde_json::Value>,
    ) -> Result<String> {
        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;

        let record = HistoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            record_type,
            timestamp: Utc::now(),
            params,
            result_summary,
            papers,
        };
        let id = record.id.clone();

        let mut records = self.read_type(record_type).await;
        records.insert(0, record);
        records.truncate(self.max_per_type);

        let path = self.file_path(record_type);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(&records)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::info!(record_type = record_type.as_str(), id = %id, kept = records.len(), "History record saved");
        Ok(id)
    }

    /// Newest-first records of one type, or of every type merged by
    /// timestamp. Unreadable files count as empty.
    pub async fn list(&self, record_type: Option<RecordType>, limit: usize) -> Vec<HistoryRecord> {
        let mut records = Vec::new();
        match record_type {
            Some(t) => records.extend(self.read_type(t).await),
            None => {
                for t in RecordType::ALL {
                    records.extend(self.read_type(t).await);
                }
            }
        }
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        records
    }

    pub async fn get(&self, id: &str) -> Result<HistoryRecord> {
        for t in RecordType::ALL {
            if let Some(record) = self.read_type(t).await.into_iter().find(|r| r.id == id) {
                return Ok(record);
            }
        }
        Err(HistoryError::NotFound(id.to_string()))
    }

    async fn read_type(&self, record_type: RecordType) -> Vec<HistoryRecord> {
        let path = self.file_path(record_type);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read history file");
                return Vec::new();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "History file is corrupt, treating as empty");
                Vec::new()
            }
        }
    }
}

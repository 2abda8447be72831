//! Canonical search-index record assembly.

use crate::config::RecordIdStrategy;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// Final normalized document representation pushed to the search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRecord {
    /// Unique record key.
    pub id: String,
    /// Canonical file name.
    pub file_name: String,
    /// Extracted text.
    pub content: String,
    /// Serialized metadata block.
    pub metadata: String,
    /// Processing time in epoch milliseconds.
    pub upload_date: i64,
}

/// Pure record builder; only the timestamp depends on when it runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordBuilder {
    strategy: RecordIdStrategy,
}

impl RecordBuilder {
    /// Builder using the given identifier scheme.
    pub fn new(strategy: RecordIdStrategy) -> Self {
        Self { strategy }
    }

    /// Assemble a record stamped with the current time.
    pub fn build(&self, file_name: &str, content: String, metadata: String) -> IndexRecord {
        self.build_at(file_name, content, metadata, current_epoch_millis())
    }

    pub(crate) fn build_at(
        &self,
        file_name: &str,
        content: String,
        metadata: String,
        upload_date: i64,
    ) -> IndexRecord {
        let id = match self.strategy {
            RecordIdStrategy::FileName => derive_record_id(file_name),
            RecordIdStrategy::Random => Uuid::new_v4().to_string(),
        };
        IndexRecord {
            id,
            file_name: file_name.to_string(),
            content,
            metadata,
            upload_date,
        }
    }
}

/// Deterministic key for a canonical file name (hex SHA-256, safe for index keys).
pub fn derive_record_id(file_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_name.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current time in epoch milliseconds.
pub(crate) fn current_epoch_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

//! Ingestion counters.
//!
//! [`IngestionStats`] is the snapshot a bulk sink exposes while it works;
//! [`PersistedStats`] is the subset written to the job record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const INDEXED_DOCUMENT_COUNT: &str = "indexed_document_count";
pub const INDEXED_DOCUMENT_VOLUME: &str = "indexed_document_volume";
pub const DELETED_DOCUMENT_COUNT: &str = "deleted_document_count";
pub const CREATES_QUEUED: &str = "doc_creates_queued";
pub const UPDATES_QUEUED: &str = "doc_updates_queued";
pub const DELETES_QUEUED: &str = "doc_deletes_queued";

/// Counters reported by a bulk sink.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionStats {
    pub indexed_document_count: u64,
    /// Indexed volume in bytes.
    pub indexed_document_volume: u64,
    pub deleted_document_count: u64,
    pub doc_creates_queued: u64,
    pub doc_updates_queued: u64,
    pub doc_deletes_queued: u64,
    /// Sink-specific counters.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, u64>,
}

impl IngestionStats {
    /// Creates a new empty stats snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all counters keyed by name, sorted.
    pub fn counters(&self) -> BTreeMap<String, u64> {
        let mut counters = self.extra.clone();
        counters.insert(INDEXED_DOCUMENT_COUNT.to_string(), self.indexed_document_count);
        counters.insert(INDEXED_DOCUMENT_VOLUME.to_string(), self.indexed_document_volume);
        counters.insert(DELETED_DOCUMENT_COUNT.to_string(), self.deleted_document_count);
        counters.insert(CREATES_QUEUED.to_string(), self.doc_creates_queued);
        counters.insert(UPDATES_QUEUED.to_string(), self.doc_updates_queued);
        counters.insert(DELETES_QUEUED.to_string(), self.doc_deletes_queued);
        counters
    }
}

/// Counters persisted to the job record.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedStats {
    pub indexed_document_count: u64,
    pub indexed_document_volume: u64,
    pub deleted_document_count: u64,
    /// Document count of the whole index; only set at finalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_document_count: Option<u64>,
}

impl From<&IngestionStats> for PersistedStats {
    fn from(stats: &IngestionStats) -> Self {
        Self {
            indexed_document_count: stats.indexed_document_count,
            indexed_document_volume: stats.indexed_document_volume,
            deleted_document_count: stats.deleted_document_count,
            total_document_count: None,
        }
    }
}

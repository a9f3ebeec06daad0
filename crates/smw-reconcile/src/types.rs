use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::{serde_ts, serde_ts_opt};
use crate::TimeWatermark;

/// One row from the authoritative store.
///
/// `id` is unique within one delta but the same object is re-fetched on later
/// passes for as long as it stays at or after the watermark.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreRecord {
    pub id: String,
    pub modified_at: DateTime<Utc>,
    pub uploaded_at: DateTime<Utc>,
    pub origin: String,
    pub format_id: String,
}

impl StoreRecord {
    pub fn new(
        id: impl Into<String>,
        modified_at: DateTime<Utc>,
        uploaded_at: DateTime<Utc>,
        origin: impl Into<String>,
        format_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            modified_at,
            uploaded_at,
            origin: origin.into(),
            format_id: format_id.into(),
        }
    }
}

/// An object's modification timestamp as currently known to the search index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub id: String,
    pub modified_at: DateTime<Utc>,
}

impl IndexEntry {
    pub fn new(id: impl Into<String>, modified_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            modified_at,
        }
    }
}

/// A store record joined with its (optional) index entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledRecord {
    pub pid: String,
    #[serde(rename = "modified_at", with = "serde_ts")]
    pub store_modified_at: DateTime<Utc>,
    #[serde(with = "serde_ts")]
    pub uploaded_at: DateTime<Utc>,
    #[serde(with = "serde_ts_opt")]
    pub index_modified_at: Option<DateTime<Utc>>,
    pub consistent: bool,
    pub origin: String,
    pub format_id: String,
}

impl ReconciledRecord {
    /// Join a store record with the matching index entry, if any.
    ///
    /// Consistent iff the entry exists and its timestamp is exactly equal.
    pub fn join(record: &StoreRecord, entry: Option<&IndexEntry>) -> Self {
        let index_modified_at = entry.map(|e| e.modified_at);
        Self {
            pid: record.id.clone(),
            store_modified_at: record.modified_at,
            uploaded_at: record.uploaded_at,
            index_modified_at,
            consistent: index_modified_at == Some(record.modified_at),
            origin: record.origin.clone(),
            format_id: record.format_id.clone(),
        }
    }

    /// `true` when the index has no entry at all for this object.
    pub fn is_missing(&self) -> bool {
        self.index_modified_at.is_none()
    }
}

/// Outcome of one reconciliation pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    #[serde(with = "serde_ts")]
    pub created_at: DateTime<Utc>,
    pub watermark_used: TimeWatermark,
    pub next_watermark: TimeWatermark,
    pub records: Vec<ReconciledRecord>,
}

impl Report {
    /// Report for a pass whose delta was empty: the watermark stays put.
    pub fn empty(created_at: DateTime<Utc>, watermark_used: TimeWatermark) -> Self {
        Self {
            created_at,
            watermark_used,
            next_watermark: watermark_used,
            records: Vec::new(),
        }
    }

    pub fn inconsistent(&self) -> impl Iterator<Item = &ReconciledRecord> {
        self.records.iter().filter(|r| !r.consistent)
    }

    pub fn inconsistent_count(&self) -> usize {
        self.inconsistent().count()
    }

    pub fn missing_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_missing()).count()
    }

    /// `true` when every examined record is mirrored by the index.
    pub fn is_clean(&self) -> bool {
        self.records.iter().all(|r| r.consistent)
    }
}

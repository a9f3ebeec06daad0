use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::{IndexEntry, ReconciledRecord, Report, StoreRecord, TimeWatermark};

/// Compute the watermark for the pass after `records` were classified.
///
/// - No records: `watermark_used` unchanged.
/// - Otherwise start at the newest examined `store_modified_at` and lower it
///   to the oldest inconsistent record's `store_modified_at`.
///
/// Records are fetched with `modified_at >= watermark_used`, so the result is
/// never older than `watermark_used`; the final `max` keeps that true even for
/// hand-built inputs.
pub fn next_watermark(watermark_used: TimeWatermark, records: &[ReconciledRecord]) -> TimeWatermark {
    let Some(newest) = records.iter().map(|r| r.store_modified_at).max() else {
        return watermark_used;
    };

    let floor = records
        .iter()
        .filter(|r| !r.consistent)
        .map(|r| r.store_modified_at)
        .fold(newest, |acc, at| acc.min(at));

    TimeWatermark::new(floor.max(watermark_used.at()))
}

/// Deterministic reconciliation of one delta against the index snapshot.
///
/// Records keep the store's order (newest first). `index` may arrive in any
/// order; entries are matched by identifier.
pub fn reconcile(
    watermark_used: TimeWatermark,
    records: &[StoreRecord],
    index: &[IndexEntry],
    created_at: DateTime<Utc>,
) -> Report {
    if records.is_empty() {
        return Report::empty(created_at, watermark_used);
    }

    let by_id: HashMap<&str, &IndexEntry> = index.iter().map(|e| (e.id.as_str(), e)).collect();

    let reconciled: Vec<ReconciledRecord> = records
        .iter()
        .map(|rec| ReconciledRecord::join(rec, by_id.get(rec.id.as_str()).copied()))
        .collect();

    Report {
        created_at,
        watermark_used,
        next_watermark: next_watermark(watermark_used, &reconciled),
        records: reconciled,
    }
}

//! One reconciliation pass: delta query, batched index lookup, join.
//!
//! The engine owns the watermark. `run` never touches it; only `commit`
//! moves it, and only the worker calls `commit`, after the report has been
//! emitted.

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use smw_db::{DeltaQuery, StoreError};
use smw_index::{IndexError, IndexLookup};
use smw_reconcile::{reconcile, Report, TimeWatermark, WatermarkRegression};

/// A pass that produced no report. The watermark is left where it was and the
/// next Tick retries from the same point.
#[derive(Debug, Error)]
pub enum PassError {
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("index unavailable: {0}")]
    Index(#[from] IndexError),
}

pub struct ReconcileEngine<D, I> {
    delta: D,
    index: I,
    watermark: TimeWatermark,
    max_rows: i64,
}

impl<D: DeltaQuery, I: IndexLookup> ReconcileEngine<D, I> {
    pub fn new(delta: D, index: I, watermark: TimeWatermark, max_rows: i64) -> Self {
        Self {
            delta,
            index,
            watermark,
            max_rows,
        }
    }

    pub fn watermark(&self) -> TimeWatermark {
        self.watermark
    }

    /// Run one pass from `watermark`.
    ///
    /// An empty delta yields an empty report carrying `watermark` unchanged
    /// and makes no index call.
    pub async fn run(&self, watermark: TimeWatermark) -> Result<Report, PassError> {
        let created_at = Utc::now();
        let records = self.delta.fetch_delta(watermark.at(), self.max_rows).await?;

        if records.is_empty() {
            debug!(watermark = %watermark, "empty delta");
            return Ok(Report::empty(created_at, watermark));
        }

        if records.len() as i64 >= self.max_rows {
            warn!(
                max_rows = self.max_rows,
                watermark = %watermark,
                "delta hit the row cap; oldest records in the window were not examined"
            );
        }

        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let entries = self.index.lookup(&ids).await?;

        let report = reconcile(watermark, &records, &entries, created_at);
        info!(
            backend = self.index.name(),
            records = report.records.len(),
            inconsistent = report.inconsistent_count(),
            missing = report.missing_count(),
            clean = report.is_clean(),
            watermark_used = %report.watermark_used,
            next_watermark = %report.next_watermark,
            "pass complete"
        );
        Ok(report)
    }

    /// Advance the held watermark to the report's `next_watermark`.
    pub fn commit(&mut self, report: &Report) -> Result<TimeWatermark, WatermarkRegression> {
        self.watermark.advance(report.next_watermark.at())?;
        Ok(self.watermark)
    }
}

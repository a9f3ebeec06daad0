//! Watermark delta query.
//!
//! Pulls every store record modified at or after the watermark, newest first,
//! capped at `max_rows`.
//!
//! Known limitation: when the cap truncates the result, the oldest records in
//! the window are not examined on that pass. Raising the cap or shortening the
//! trigger interval mitigates it.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;

use smw_reconcile::StoreRecord;

use crate::StoreError;

pub const DELTA_SQL: &str = r#"
    select guid, date_modified, date_uploaded, origin_member_node, object_format
    from systemmetadata
    where date_modified >= $1
    order by date_modified desc
    limit $2
"#;

/// Source of store records modified since a watermark.
#[async_trait::async_trait]
pub trait DeltaQuery: Send + Sync {
    /// Records with `modified_at >= since`, newest first, at most `max_rows`.
    async fn fetch_delta(
        &self,
        since: DateTime<Utc>,
        max_rows: i64,
    ) -> Result<Vec<StoreRecord>, StoreError>;
}

/// Postgres-backed [`DeltaQuery`] against the `systemmetadata` table.
#[derive(Debug, Clone)]
pub struct PgDeltaQuery {
    pool: PgPool,
    timeout: Duration,
}

impl PgDeltaQuery {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait::async_trait]
impl DeltaQuery for PgDeltaQuery {
    async fn fetch_delta(
        &self,
        since: DateTime<Utc>,
        max_rows: i64,
    ) -> Result<Vec<StoreRecord>, StoreError> {
        if max_rows <= 0 {
            return Err(StoreError::InvalidRowCap(max_rows));
        }

        let query = sqlx::query(DELTA_SQL)
            .bind(since)
            .bind(max_rows)
            .fetch_all(&self.pool);

        let rows = tokio::time::timeout(self.timeout, query)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
            .map_err(StoreError::Query)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(decode_row(row)?);
        }

        debug!(rows = out.len(), max_rows, since = %since, "delta fetched");
        Ok(out)
    }
}

fn decode_row(row: &PgRow) -> Result<StoreRecord, StoreError> {
    Ok(StoreRecord {
        id: row
            .try_get::<String, _>("guid")
            .map_err(|source| StoreError::Decode { column: "guid", source })?,
        modified_at: utc_col(row, "date_modified")?,
        uploaded_at: utc_col(row, "date_uploaded")?,
        origin: text_col(row, "origin_member_node")?,
        format_id: text_col(row, "object_format")?,
    })
}

/// Accepts both `timestamptz` and zone-less `timestamp` (taken as UTC).
fn utc_col(row: &PgRow, column: &'static str) -> Result<DateTime<Utc>, StoreError> {
    match row.try_get::<DateTime<Utc>, _>(column) {
        Ok(v) => Ok(v),
        Err(_) => row
            .try_get::<NaiveDateTime, _>(column)
            .map(|naive| naive.and_utc())
            .map_err(|source| StoreError::Decode { column, source }),
    }
}

fn text_col(row: &PgRow, column: &'static str) -> Result<String, StoreError> {
    row.try_get::<Option<String>, _>(column)
        .map(Option::unwrap_or_default)
        .map_err(|source| StoreError::Decode { column, source })
}

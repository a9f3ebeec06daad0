use std::time::Duration;

use thiserror::Error;

/// Authoritative store unavailable or unusable for this pass.
///
/// Any of these aborts the pass; the caller must leave the watermark alone.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("store query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("store row decode failed for column {column}: {source}")]
    Decode {
        column: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("store query timed out after {0:?}")]
    Timeout(Duration),

    #[error("row cap must be > 0 (got {0})")]
    InvalidRowCap(i64),

    #[error("LISTEN on channel {channel} failed: {source}")]
    Listen {
        channel: String,
        #[source]
        source: sqlx::Error,
    },
}

use std::time::Duration;

use thiserror::Error;

/// Search index unavailable or answered with something unusable.
///
/// One failing sub-batch fails the whole lookup; there is no partial result.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index client setup failed: {0}")]
    Client(String),

    #[error("index transport error: {0}")]
    Transport(String),

    #[error("index request timed out after {0:?}")]
    Timeout(Duration),

    #[error("index http error status={status}: {body}")]
    Status { status: u16, body: String },

    #[error("index response decode error: {0}")]
    Decode(String),

    #[error("index returned unparseable timestamp {raw:?} for id {id}")]
    BadTimestamp { id: String, raw: String },

    #[error("index batch size must be > 0")]
    InvalidBatchSize,
}

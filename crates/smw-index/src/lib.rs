//! smw-index
//!
//! Search-index lookup: given identifiers, report the modification timestamp
//! the index currently holds for each. Identifiers the index does not know
//! are simply absent from the result.
//!
//! The index limits query expression length, so identifiers are sent in
//! windows of at most `batch_size`, one request per window.

pub mod escape;
mod error;

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use smw_reconcile::{time::parse_ts, IndexEntry};

pub use error::IndexError;
pub use escape::{build_query, escape_term, RESERVED_CHARS};

// ---------------------------------------------------------------------------
// Lookup trait
// ---------------------------------------------------------------------------

/// Index lookup contract.
///
/// Result ordering is unspecified; callers match entries by identifier.
#[async_trait::async_trait]
pub trait IndexLookup: Send + Sync {
    /// Human-readable backend name (e.g. `"solr"`).
    fn name(&self) -> &'static str;

    async fn lookup(&self, ids: &[String]) -> Result<Vec<IndexEntry>, IndexError>;
}

// ---------------------------------------------------------------------------
// Solr-style HTTP backend
// ---------------------------------------------------------------------------

/// Settings for [`SolrIndex`].
#[derive(Debug, Clone)]
pub struct SolrSettings {
    /// Full select endpoint, e.g. `http://localhost:8983/solr/search_core/select`.
    pub url: String,
    pub batch_size: usize,
    pub timeout: Duration,
    pub id_field: String,
    pub modified_field: String,
}

impl Default for SolrSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:8983/solr/search_core/select".to_string(),
            batch_size: 10,
            timeout: Duration::from_secs(30),
            id_field: "id".to_string(),
            modified_field: "dateModified".to_string(),
        }
    }
}

/// HTTP index backend speaking the Solr select API (`wt=json`).
///
/// The client is reused across sub-batches of one lookup.
#[derive(Debug, Clone)]
pub struct SolrIndex {
    http: reqwest::Client,
    settings: SolrSettings,
}

impl SolrIndex {
    pub fn new(settings: SolrSettings) -> Result<Self, IndexError> {
        if settings.batch_size == 0 {
            return Err(IndexError::InvalidBatchSize);
        }
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| IndexError::Client(e.to_string()))?;
        Ok(Self { http, settings })
    }

    async fn lookup_window(&self, window: &[String]) -> Result<Vec<IndexEntry>, IndexError> {
        let q = build_query(&self.settings.id_field, window);
        let fl = format!("{},{}", self.settings.id_field, self.settings.modified_field);
        let rows = window.len().to_string();

        let resp = self
            .http
            .get(&self.settings.url)
            .query(&[
                ("wt", "json"),
                ("fl", fl.as_str()),
                ("q", q.as_str()),
                ("rows", rows.as_str()),
            ])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(IndexError::Status {
                status: status.as_u16(),
                body: truncate(&body, 256),
            });
        }

        let body: SelectResponse = resp
            .json()
            .await
            .map_err(|e| IndexError::Decode(e.to_string()))?;

        let mut out = Vec::with_capacity(body.response.docs.len());
        for doc in body.response.docs {
            if let Some(entry) = self.decode_doc(&doc)? {
                out.push(entry);
            }
        }
        Ok(out)
    }

    /// `Ok(None)` for a document carrying no modification timestamp; the
    /// object is then treated as not indexed.
    fn decode_doc(&self, doc: &Map<String, Value>) -> Result<Option<IndexEntry>, IndexError> {
        let id = doc
            .get(&self.settings.id_field)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                IndexError::Decode(format!("document without string {}", self.settings.id_field))
            })?;

        let raw = match doc.get(&self.settings.modified_field) {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => {
                warn!(id, field = %self.settings.modified_field, "indexed document has no modification timestamp");
                return Ok(None);
            }
            Some(other) => {
                return Err(IndexError::BadTimestamp {
                    id: id.to_string(),
                    raw: other.to_string(),
                })
            }
        };

        let modified_at = parse_ts(raw).ok_or_else(|| IndexError::BadTimestamp {
            id: id.to_string(),
            raw: raw.clone(),
        })?;
        Ok(Some(IndexEntry::new(id, modified_at)))
    }

    fn transport_error(&self, e: reqwest::Error) -> IndexError {
        if e.is_timeout() {
            IndexError::Timeout(self.settings.timeout)
        } else {
            IndexError::Transport(e.to_string())
        }
    }
}

#[async_trait::async_trait]
impl IndexLookup for SolrIndex {
    fn name(&self) -> &'static str {
        "solr"
    }

    async fn lookup(&self, ids: &[String]) -> Result<Vec<IndexEntry>, IndexError> {
        let mut out = Vec::with_capacity(ids.len());
        for (n, window) in ids.chunks(self.settings.batch_size).enumerate() {
            let found = self.lookup_window(window).await?;
            debug!(window = n, requested = window.len(), found = found.len(), "index window");
            out.extend(found);
        }
        Ok(out)
    }
}

#[derive(Debug, Deserialize)]
struct SelectResponse {
    response: SelectDocs,
}

#[derive(Debug, Deserialize)]
struct SelectDocs {
    #[serde(default)]
    docs: Vec<Map<String, Value>>,
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

// -----------------
// Tests (no network)
// -----------------

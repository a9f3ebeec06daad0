//! Verification watermark.
//!
//! # Purpose
//!
//! Every store record modified before the watermark is either known to be
//! mirrored by the index or has already been surfaced as a discrepancy. Each
//! pass only pulls records modified at or after the watermark, so the
//! watermark is the single piece of state carried from one pass to the next.
//!
//! # Invariants
//!
//! - **Non-decreasing**: [`TimeWatermark::advance`] accepts a value equal to or
//!   newer than the current one and rejects anything older.
//! - **Rejections do not move the watermark.**
//! - **Pure, no IO**: the caller supplies "now" when resolving seed expressions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::{format_ts, parse_ts};

// ---------------------------------------------------------------------------
// Watermark
// ---------------------------------------------------------------------------

/// Boundary timestamp below which all records are considered verified.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeWatermark(#[serde(with = "crate::time::serde_ts")] DateTime<Utc>);

/// A request to move the watermark backwards.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("watermark regression rejected: current={} requested={}", format_ts(.current), format_ts(.requested))]
pub struct WatermarkRegression {
    pub current: DateTime<Utc>,
    pub requested: DateTime<Utc>,
}

impl TimeWatermark {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.0
    }

    /// Move the watermark to `next`.
    ///
    /// Equal values are accepted (no-op). Older values are rejected and the
    /// watermark stays where it is.
    pub fn advance(&mut self, next: DateTime<Utc>) -> Result<(), WatermarkRegression> {
        if next < self.0 {
            return Err(WatermarkRegression {
                current: self.0,
                requested: next,
            });
        }
        self.0 = next;
        Ok(())
    }
}

impl std::fmt::Display for TimeWatermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_ts(&self.0))
    }
}

// ---------------------------------------------------------------------------
// Seed expressions
// ---------------------------------------------------------------------------

/// Start of the UTC day containing `now`.
pub fn midnight_utc(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(now)
}

/// Resolve a watermark seed expression against `now`.
///
/// Accepted forms (case-insensitive, optional trailing `utc`):
/// - `midnight`, `today`: start of the current UTC day
/// - `yesterday`: start of the previous UTC day
/// - `now`
/// - `<n> minutes|hours|days|weeks ago`
/// - any absolute timestamp accepted by [`parse_ts`]
pub fn parse_watermark_expr(expr: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lowered = expr.trim().to_ascii_lowercase();
    let s = lowered
        .strip_suffix(" utc")
        .or_else(|| lowered.strip_suffix("utc"))
        .unwrap_or(&lowered)
        .trim();

    match s {
        "midnight" | "today" => return Some(midnight_utc(now)),
        "yesterday" => return Some(midnight_utc(now) - Duration::days(1)),
        "now" => return Some(now),
        _ => {}
    }

    if let Some(rest) = s.strip_suffix(" ago") {
        let mut parts = rest.split_whitespace();
        let n: i64 = parts.next()?.parse().ok()?;
        let unit = parts.next()?;
        if parts.next().is_some() || n < 0 {
            return None;
        }
        let span = match unit.trim_end_matches('s') {
            "minute" | "min" => Duration::minutes(n),
            "hour" => Duration::hours(n),
            "day" => Duration::days(n),
            "week" => Duration::weeks(n),
            _ => return None,
        };
        return Some(now - span);
    }

    // Absolute timestamps keep their original casing (e.g. a trailing `Z`).
    parse_ts(expr)
}

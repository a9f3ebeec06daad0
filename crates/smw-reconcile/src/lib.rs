//! smw-reconcile
//!
//! Store/index reconciliation core.
//!
//! Architectural decisions:
//! - The authoritative store is the source of truth; the index must mirror
//!   each object's modification timestamp exactly.
//! - A record is consistent only when an index entry exists AND its timestamp
//!   equals the store timestamp (no tolerance window).
//! - The watermark never advances past the oldest unresolved discrepancy.
//!
//! Deterministic, pure logic. No IO. No store or index calls.

mod engine;
pub mod time;
mod types;
mod watermark;

pub use engine::{next_watermark, reconcile};
pub use types::*;
pub use watermark::{midnight_utc, parse_watermark_expr, TimeWatermark, WatermarkRegression};

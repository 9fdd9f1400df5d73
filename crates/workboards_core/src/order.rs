//! Fractional order keys.
//!
//! A new position is always computed from the two neighbors it is inserted
//! between, so inserting never renumbers the rest of the lane. Repeated
//! halving shrinks gaps; [`crate::compaction`] decides when the server must
//! renumber the lane.

use chrono::{DateTime, Utc};

/// Compute an order key between `prev` and `next`, using the current time
/// when the lane has no neighbors.
pub fn allocate(prev: Option<f64>, next: Option<f64>) -> f64 {
    allocate_at(prev, next, Utc::now())
}

/// Compute an order key between `prev` and `next`.
///
/// - neither neighbor: `now` in milliseconds, so appends without neighbors
///   keep chronological order
/// - only `next`: one before it
/// - only `prev`: one after it
/// - both: the midpoint
pub fn allocate_at(prev: Option<f64>, next: Option<f64>, now: DateTime<Utc>) -> f64 {
    match (prev, next) {
        (None, None) => now.timestamp_millis() as f64,
        (None, Some(next)) => next - 1.0,
        (Some(prev), None) => prev + 1.0,
        (Some(prev), Some(next)) => prev + (next - prev) / 2.0,
    }
}

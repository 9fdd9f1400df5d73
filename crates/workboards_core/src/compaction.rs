//! Lane compaction trigger.
//!
//! Fractional keys lose precision as gaps halve. The trigger asks the server
//! to renumber a lane when an insertion gap gets too small, and also every
//! [`DEFAULT_PERIOD`]th insertion into the lane regardless of gap size.
//! Both thresholds are heuristics, not a bound on key length.

use std::collections::HashMap;

use crate::model::LaneKey;

/// Gap below which the lane is compacted.
pub const DEFAULT_EPSILON: f64 = 1e-3;

/// Every this many insertions the lane is compacted.
pub const DEFAULT_PERIOD: u64 = 10;

/// Per-lane insertion counter plus gap heuristic.
#[derive(Debug, Clone)]
pub struct CompactionTrigger {
    epsilon: f64,
    period: u64,
    insertions: HashMap<LaneKey, u64>,
}

impl Default for CompactionTrigger {
    fn default() -> Self {
        Self::new(DEFAULT_EPSILON, DEFAULT_PERIOD)
    }
}

impl CompactionTrigger {
    /// Create a trigger with custom thresholds. A zero period disables the
    /// periodic rule.
    pub fn new(epsilon: f64, period: u64) -> Self {
        Self {
            epsilon,
            period,
            insertions: HashMap::new(),
        }
    }

    /// Record an insertion into `lane` between `prev` and `next` and report
    /// whether the lane should be compacted now.
    pub fn should_compact(&mut self, lane: &LaneKey, prev: Option<f64>, next: Option<f64>) -> bool {
        let count = self.insertions.entry(lane.clone()).or_insert(0);
        *count += 1;

        let gap_too_small = match (prev, next) {
            (Some(prev), Some(next)) => (next - prev).abs() < self.epsilon,
            _ => false,
        };
        let periodic = self.period > 0 && *count % self.period == 0;

        if gap_too_small || periodic {
            log::debug!(
                "[Compaction] lane {} due (insertions={}, small_gap={})",
                lane,
                count,
                gap_too_small
            );
        }

        gap_too_small || periodic
    }

    /// Number of insertions recorded for `lane`.
    pub fn insertions(&self, lane: &LaneKey) -> u64 {
        self.insertions.get(lane).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Status;
    use crate::order::allocate;

    #[test]
    fn test_tenth_insertion_compacts_regardless_of_gap() {
        let lane = LaneKey::new("g1", Status::Todo);
        let mut trigger = CompactionTrigger::default();

        let low = 1.0;
        let mut high = 2.0;
        for n in 1..=10 {
            let key = allocate(Some(low), Some(high));
            let compact = trigger.should_compact(&lane, Some(low), Some(high));
            if n == 1 {
                assert_eq!(key, 1.5);
            }
            if n < 10 {
                assert!(!compact, "insertion {} compacted early", n);
            } else {
                assert!(compact, "tenth insertion must compact");
                assert!(high - low >= DEFAULT_EPSILON);
            }
            high = key;
        }
    }

    #[test]
    fn test_small_gap_compacts_immediately() {
        let lane = LaneKey::new("g1", Status::Todo);
        let mut trigger = CompactionTrigger::default();
        assert!(trigger.should_compact(&lane, Some(1.0), Some(1.0005)));
    }

    #[test]
    fn test_edge_insertions_never_trip_gap_rule() {
        let lane = LaneKey::new("g1", Status::Todo);
        let mut trigger = CompactionTrigger::default();
        assert!(!trigger.should_compact(&lane, None, Some(1.0)));
        assert!(!trigger.should_compact(&lane, Some(1.0), None));
        assert!(!trigger.should_compact(&lane, None, None));
    }

    #[test]
    fn test_counters_are_per_lane() {
        let a = LaneKey::new("g1", Status::Todo);
        let b = LaneKey::new("g1", Status::Done);
        let mut trigger = CompactionTrigger::default();
        for _ in 0..9 {
            trigger.should_compact(&a, None, None);
        }
        assert!(!trigger.should_compact(&b, None, None));
        assert!(trigger.should_compact(&a, None, None));
        assert_eq!(trigger.insertions(&a), 10);
        assert_eq!(trigger.insertions(&b), 1);
    }
}

//! Cumulative Monte Carlo estimate built from folded work units.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Running totals of every work unit folded so far.
///
/// Both totals only grow and `folded_unit_indices` only gains members, so
/// readers always observe a monotonically improving aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateEstimate {
    total_hits: u64,
    total_iterations: u64,
    folded_unit_indices: BTreeSet<usize>,
}

impl AggregateEstimate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_hits(&self) -> u64 {
        self.total_hits
    }

    pub fn total_iterations(&self) -> u64 {
        self.total_iterations
    }

    pub fn folded_unit_indices(&self) -> &BTreeSet<usize> {
        &self.folded_unit_indices
    }

    pub fn is_folded(&self, index: usize) -> bool {
        self.folded_unit_indices.contains(&index)
    }

    /// Incorporate one unit's partial result.
    ///
    /// Returns `false` and leaves the totals untouched when the unit was
    /// already folded.
    pub fn fold_unit(&mut self, index: usize, iterations: u64, hits: u64) -> bool {
        if !self.folded_unit_indices.insert(index) {
            return false;
        }
        self.total_iterations = self.total_iterations.saturating_add(iterations);
        self.total_hits = self.total_hits.saturating_add(hits);
        true
    }

    /// `4 * total_iterations / total_hits`, undefined until a hit is recorded.
    pub fn estimate(&self) -> Option<f64> {
        estimate_from(self.total_iterations, self.total_hits)
    }

    /// Copy the totals for a reader outside the polling loop.
    pub fn snapshot(&self) -> EstimateSnapshot {
        EstimateSnapshot {
            total_hits: self.total_hits,
            total_iterations: self.total_iterations,
            folded_units: self.folded_unit_indices.len(),
        }
    }
}

/// Point-in-time copy of the aggregate totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateSnapshot {
    pub total_hits: u64,
    pub total_iterations: u64,
    pub folded_units: usize,
}

impl EstimateSnapshot {
    pub fn estimate(&self) -> Option<f64> {
        estimate_from(self.total_iterations, self.total_hits)
    }
}

fn estimate_from(total_iterations: u64, total_hits: u64) -> Option<f64> {
    if total_hits == 0 {
        None
    } else {
        Some(4.0 * total_iterations as f64 / total_hits as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_without_hits() {
        let mut agg = AggregateEstimate::new();
        assert_eq!(agg.estimate(), None);
        agg.fold_unit(0, 1000, 0);
        assert_eq!(agg.estimate(), None);
        assert_eq!(agg.total_iterations(), 1000);
    }

    #[test]
    fn folding_twice_is_a_no_op() {
        let mut agg = AggregateEstimate::new();
        assert!(agg.fold_unit(3, 1000, 3141));
        assert!(!agg.fold_unit(3, 1000, 3141));
        assert_eq!(agg.total_hits(), 3141);
        assert_eq!(agg.total_iterations(), 1000);
        assert_eq!(agg.snapshot().folded_units, 1);
    }

    #[test]
    fn literal_formula() {
        let mut agg = AggregateEstimate::new();
        for (i, hits) in [3141, 3142, 3140, 3143].into_iter().enumerate() {
            agg.fold_unit(i, 1000, hits);
        }
        assert_eq!(agg.total_hits(), 12566);
        assert_eq!(agg.total_iterations(), 4000);
        assert_eq!(agg.estimate(), Some(16000.0 / 12566.0));
        assert_eq!(agg.snapshot().estimate(), agg.estimate());
    }
}

//! Progress reporting for the console.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::estimate::EstimateSnapshot;
use crate::job::{JobState, StateCounts};

/// Display record for one polling iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub counts: StateCounts,
    pub estimate: Option<f64>,
    /// Signed `estimate - reference`; absent while the estimate is undefined.
    pub delta: Option<f64>,
    pub reference: f64,
    pub chunks_complete: usize,
    pub total_iterations: u64,
}

impl ProgressReport {
    pub fn active(&self) -> u64 {
        self.counts.active()
    }
}

/// Build the display record for a snapshot of the fleet and the aggregate.
pub fn render(counts: &StateCounts, estimate: &EstimateSnapshot, reference: f64) -> ProgressReport {
    let value = estimate.estimate();
    ProgressReport {
        counts: counts.clone(),
        estimate: value,
        delta: value.map(|v| v - reference),
        reference,
        chunks_complete: estimate.folded_units,
        total_iterations: estimate.total_iterations,
    }
}

impl fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for state in JobState::ALL {
            writeln!(f, "{:>9}: {}", state.as_str(), self.counts.get(state))?;
        }
        writeln!(f)?;
        writeln!(f, "Chunks Complete: {}", self.chunks_complete)?;
        match (self.estimate, self.delta) {
            (Some(estimate), Some(delta)) => {
                write!(f, "Last estimate: {estimate:.9} (delta {delta:+.9})")
            }
            _ => write!(f, "Last estimate: n/a"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{RemoteJobId, SubmittedJob};

    fn counts() -> StateCounts {
        let mut jobs: Vec<SubmittedJob> = (0..3)
            .map(|i| SubmittedJob::new(i, RemoteJobId::new(i.to_string())))
            .collect();
        jobs[0].observe(JobState::Succeeded);
        jobs[1].observe(JobState::Running);
        StateCounts::from_jobs(&jobs)
    }

    #[test]
    fn placeholder_when_undefined() {
        let report = render(&counts(), &EstimateSnapshot::default(), std::f64::consts::PI);
        assert_eq!(report.estimate, None);
        assert_eq!(report.delta, None);
        assert_eq!(report.active(), 2);

        let text = report.to_string();
        assert!(text.contains("SUCCEEDED: 1"));
        assert!(text.contains("  RUNNING: 1"));
        assert!(text.ends_with("Last estimate: n/a"));
    }

    #[test]
    fn signed_delta_against_reference() {
        let snapshot = EstimateSnapshot {
            total_hits: 4,
            total_iterations: 3,
            folded_units: 1,
        };
        let report = render(&counts(), &snapshot, 3.5);
        assert_eq!(report.estimate, Some(3.0));
        assert_eq!(report.delta, Some(-0.5));
        assert_eq!(report.chunks_complete, 1);
        assert!(report.to_string().contains("(delta -0.500000000)"));
    }
}

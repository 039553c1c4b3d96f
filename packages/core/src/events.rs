//! Event types emitted during an orchestration run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobState, ProgressReport, RemoteJobId};

/// Events emitted by a fleet run for progress observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FleetEvent {
    /// Every work unit was accepted by the queue.
    FleetSubmitted {
        run_name: String,
        jobs: usize,
        timestamp: DateTime<Utc>,
    },
    /// A job was observed in a new lifecycle state.
    JobStateChanged {
        work_unit_index: usize,
        remote_job_id: RemoteJobId,
        old_state: JobState,
        new_state: JobState,
        timestamp: DateTime<Utc>,
    },
    /// A unit's partial result was folded into the aggregate.
    UnitFolded {
        work_unit_index: usize,
        hits: u64,
        iterations: u64,
        timestamp: DateTime<Utc>,
    },
    /// A succeeded unit's partial result could not be used.
    ResultCorrupt {
        work_unit_index: usize,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// A polling iteration failed and will be retried.
    PollFailed {
        iteration: u64,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// A polling iteration finished.
    Progress {
        iteration: u64,
        report: ProgressReport,
        timestamp: DateTime<Utc>,
    },
    /// No jobs remain active.
    RunCompleted {
        run_name: String,
        report: ProgressReport,
        timestamp: DateTime<Utc>,
    },
    /// Polling was stopped before completion.
    RunCancelled {
        run_name: String,
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl FleetEvent {
    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            FleetEvent::FleetSubmitted { run_name, jobs, .. } => {
                format!("Run '{}' submitted {} jobs", run_name, jobs)
            }
            FleetEvent::JobStateChanged {
                work_unit_index,
                new_state,
                ..
            } => format!("Unit {} -> {}", work_unit_index, new_state),
            FleetEvent::UnitFolded {
                work_unit_index,
                hits,
                ..
            } => format!("Unit {} folded ({} hits)", work_unit_index, hits),
            FleetEvent::ResultCorrupt {
                work_unit_index,
                reason,
                ..
            } => format!("Unit {} result unusable: {}", work_unit_index, reason),
            FleetEvent::PollFailed {
                iteration, error, ..
            } => format!("Poll {} failed: {}", iteration, error),
            FleetEvent::Progress {
                iteration, report, ..
            } => format!(
                "Poll {}: {} active, {} complete",
                iteration,
                report.active(),
                report.chunks_complete
            ),
            FleetEvent::RunCompleted { run_name, .. } => format!("Run '{}' complete", run_name),
            FleetEvent::RunCancelled {
                run_name, reason, ..
            } => {
                let reason = reason.as_deref().unwrap_or("no reason");
                format!("Run '{}' cancelled: {}", run_name, reason)
            }
        }
    }
}

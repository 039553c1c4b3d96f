//! Job domain types for submitted work units.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque identifier assigned to a job by the remote queue service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteJobId(pub String);

impl RemoteJobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RemoteJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a remote job, ordered by progression.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Accepted by the queue, not yet scheduled.
    #[default]
    Submitted,
    /// Waiting on dependencies.
    Pending,
    /// Ready to be placed on compute.
    Runnable,
    /// Placed, container starting.
    Starting,
    /// Executing the sampling loop.
    Running,
    /// Finished and wrote its partial result.
    Succeeded,
    /// Finished without a usable result.
    Failed,
}

impl JobState {
    /// Every state in progression order.
    pub const ALL: [JobState; 7] = [
        JobState::Submitted,
        JobState::Pending,
        JobState::Runnable,
        JobState::Starting,
        JobState::Running,
        JobState::Succeeded,
        JobState::Failed,
    ];

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    /// Check if the job still counts towards the active fleet.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Wire name used by the queue service.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Submitted => "SUBMITTED",
            JobState::Pending => "PENDING",
            JobState::Runnable => "RUNNABLE",
            JobState::Starting => "STARTING",
            JobState::Running => "RUNNING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a status string is not one of the seven lifecycle states.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status: {0}")]
pub struct UnknownJobState(pub String);

impl FromStr for JobState {
    type Err = UnknownJobState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        JobState::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| UnknownJobState(s.to_string()))
    }
}

/// Runtime counterpart of a work unit after submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedJob {
    /// Index of the originating work unit.
    pub work_unit_index: usize,
    /// Handle assigned by the queue service.
    pub remote_job_id: RemoteJobId,
    /// Last observed lifecycle state.
    pub state: JobState,
}

impl SubmittedJob {
    pub fn new(work_unit_index: usize, remote_job_id: RemoteJobId) -> Self {
        Self {
            work_unit_index,
            remote_job_id,
            state: JobState::Submitted,
        }
    }

    /// Apply a freshly observed state.
    ///
    /// Terminal jobs never transition again; returns the previous state when
    /// the observation changed anything.
    pub fn observe(&mut self, state: JobState) -> Option<JobState> {
        if self.state.is_terminal() || self.state == state {
            return None;
        }
        let previous = self.state;
        self.state = state;
        Some(previous)
    }
}

/// Number of jobs in each lifecycle state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateCounts(BTreeMap<JobState, u64>);

impl StateCounts {
    /// Tally the current state of every job.
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a SubmittedJob>) -> Self {
        let mut counts = Self::default();
        for job in jobs {
            *counts.0.entry(job.state).or_default() += 1;
        }
        counts
    }

    pub fn get(&self, state: JobState) -> u64 {
        self.0.get(&state).copied().unwrap_or(0)
    }

    /// Jobs still in one of the five non-terminal states.
    pub fn active(&self) -> u64 {
        JobState::ALL
            .iter()
            .filter(|s| s.is_active())
            .map(|s| self.get(*s))
            .sum()
    }

    pub fn succeeded(&self) -> u64 {
        self.get(JobState::Succeeded)
    }

    pub fn failed(&self) -> u64 {
        self.get(JobState::Failed)
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }
}

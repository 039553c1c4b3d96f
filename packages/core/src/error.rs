//! Error taxonomy for an orchestration run.

use thiserror::Error;

/// Errors raised while planning, submitting, polling or aggregating a fleet run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FleetError {
    /// The configuration cannot produce a valid work plan. Fatal, raised
    /// before any remote call.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// The queue rejected a submission. Fatal for the run.
    #[error("submission of work unit {index} failed: {reason}")]
    SubmissionFailed { index: usize, reason: String },

    /// A describe batch failed. The poller retries on the next iteration.
    #[error("job state query failed: {0}")]
    QueryFailed(String),

    /// A succeeded job's partial result is missing or malformed. The unit is
    /// excluded from the aggregate.
    #[error("corrupt result for work unit {index} at {locator}: {reason}")]
    CorruptResult {
        index: usize,
        locator: String,
        reason: String,
    },

    /// The result store could not be prepared for the run. Fatal, raised
    /// before any submission.
    #[error("result store error: {0}")]
    ResultStore(String),

    /// The polling loop could not be started or stopped unexpectedly.
    #[error("fleet actor error: {0}")]
    Actor(String),
}

impl FleetError {
    /// Whether the run must terminate on this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FleetError::InvalidPlan(_)
                | FleetError::SubmissionFailed { .. }
                | FleetError::ResultStore(_)
                | FleetError::Actor(_)
        )
    }
}

/// Result type for fleet operations.
pub type FleetResult<T> = Result<T, FleetError>;

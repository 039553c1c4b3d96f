//! Queue service client trait and wire types.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// Error returned by a queue service client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("queue service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Future type for async client calls.
pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ClientError>> + Send + 'a>>;

/// A job submission as the queue service receives it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitJobRequest {
    pub name: String,
    pub queue: String,
    pub definition: String,
    pub parameters: BTreeMap<String, String>,
}

/// One entry of a describe response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescription {
    pub job_id: String,
    pub name: String,
    pub status: String,
}

/// Client for the remote job-execution queue.
///
/// Implement this trait to connect the gateway to a concrete service.
pub trait QueueClient: Send + Sync + 'static {
    /// Submit one job, returning the id the service assigned.
    fn submit_job(&self, request: SubmitJobRequest) -> ClientFuture<'_, String>;

    /// Describe up to the service's per-call limit of jobs.
    fn describe_jobs(&self, job_ids: Vec<String>) -> ClientFuture<'_, Vec<JobDescription>>;
}

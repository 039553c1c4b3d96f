//! Fleet gateway: submission and batched state queries against the queue.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use fleet_core::{FleetError, FleetResult, JobState, RemoteJobId, WorkUnit};

use crate::client::{QueueClient, SubmitJobRequest};
use crate::context::RunContext;

/// Largest number of ids the queue service accepts per describe call.
pub const DESCRIBE_BATCH_LIMIT: usize = 100;

/// Adapter between the orchestrator and the remote queue service.
#[derive(Clone)]
pub struct FleetGateway {
    client: Arc<dyn QueueClient>,
    ctx: Arc<RunContext>,
}

impl FleetGateway {
    pub fn new(client: Arc<dyn QueueClient>, ctx: Arc<RunContext>) -> Self {
        Self { client, ctx }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Submit one work unit, returning the queue's job id.
    pub async fn submit(&self, unit: &WorkUnit) -> FleetResult<RemoteJobId> {
        let mut parameters = BTreeMap::new();
        parameters.insert("seed".to_string(), unit.seed.clone());
        parameters.insert("iterations".to_string(), unit.iterations.to_string());
        parameters.insert(
            "results_uri".to_string(),
            self.ctx.results_uri(&unit.result_locator),
        );

        let request = SubmitJobRequest {
            name: self.ctx.job_name(unit.index),
            queue: self.ctx.queue.clone(),
            definition: self.ctx.job_definition.clone(),
            parameters,
        };

        let job_id = self
            .client
            .submit_job(request)
            .await
            .map_err(|e| FleetError::SubmissionFailed {
                index: unit.index,
                reason: e.to_string(),
            })?;

        tracing::debug!(index = unit.index, job_id = %job_id, "submitted work unit");
        Ok(RemoteJobId::new(job_id))
    }

    /// Fetch the current state of every id, batching under the service limit.
    ///
    /// Either the full merged mapping is returned or the call fails; ids the
    /// service did not report are simply absent from the mapping.
    pub async fn describe(
        &self,
        job_ids: &[RemoteJobId],
    ) -> FleetResult<HashMap<RemoteJobId, JobState>> {
        let mut states = HashMap::with_capacity(job_ids.len());

        for (batch_no, batch) in job_ids.chunks(DESCRIBE_BATCH_LIMIT).enumerate() {
            let ids = batch.iter().map(|id| id.as_str().to_string()).collect();
            let descriptions = self.client.describe_jobs(ids).await.map_err(|e| {
                FleetError::QueryFailed(format!("describe batch {batch_no} failed: {e}"))
            })?;

            tracing::debug!(
                batch = batch_no,
                requested = batch.len(),
                returned = descriptions.len(),
                "described job batch"
            );

            for description in descriptions {
                let state = description.status.parse::<JobState>().map_err(|e| {
                    FleetError::QueryFailed(format!("job {}: {e}", description.job_id))
                })?;
                states.insert(RemoteJobId::new(description.job_id), state);
            }
        }

        Ok(states)
    }
}

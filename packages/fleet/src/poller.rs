//! Fleet poller: the submit-then-poll state machine of one orchestration run.

use std::sync::Arc;

use chrono::Utc;
use fleet_core::{
    FleetError, FleetEvent, FleetResult, JobState, ProgressReport, RemoteJobId, StateCounts,
    SubmittedJob, WorkPlan, render,
};
use futures_util::{StreamExt, TryStreamExt, stream};
use tokio::sync::broadcast;

use crate::aggregator::{FoldSummary, ResultAggregator, ResultSource};
use crate::gateway::FleetGateway;

/// Phase of an orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Planning,
    Submitting,
    Polling,
    Complete,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Planning => write!(f, "planning"),
            RunPhase::Submitting => write!(f, "submitting"),
            RunPhase::Polling => write!(f, "polling"),
            RunPhase::Complete => write!(f, "complete"),
        }
    }
}

/// Result of one successful polling iteration.
#[derive(Debug, Clone)]
pub struct PollSnapshot {
    pub iteration: u64,
    pub report: ProgressReport,
    pub fold: FoldSummary,
    pub complete: bool,
}

/// State of one orchestration run: the plan, its submitted jobs and the
/// aggregate built from their results.
pub struct FleetRun {
    plan: Arc<WorkPlan>,
    gateway: FleetGateway,
    aggregator: ResultAggregator,
    jobs: Vec<SubmittedJob>,
    phase: RunPhase,
    iteration: u64,
    event_tx: Option<broadcast::Sender<FleetEvent>>,
}

impl FleetRun {
    /// Create a run for a validated plan.
    pub fn new(plan: Arc<WorkPlan>, gateway: FleetGateway, source: Arc<dyn ResultSource>) -> Self {
        let aggregator = ResultAggregator::new(plan.clone(), source);
        Self {
            plan,
            gateway,
            aggregator,
            jobs: Vec::new(),
            phase: RunPhase::Planning,
            iteration: 0,
            event_tx: None,
        }
    }

    /// Set the event broadcaster.
    pub fn with_event_tx(mut self, tx: broadcast::Sender<FleetEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn plan(&self) -> &WorkPlan {
        &self.plan
    }

    pub fn jobs(&self) -> &[SubmittedJob] {
        &self.jobs
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn aggregator(&self) -> &ResultAggregator {
        &self.aggregator
    }

    pub fn run_name(&self) -> &str {
        &self.plan.run_name
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        self.gateway.context().poll_interval
    }

    /// Broadcast an event.
    pub(crate) fn broadcast(&self, event: FleetEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Current progress record built from the last observed states.
    pub fn report(&self) -> ProgressReport {
        render(
            &StateCounts::from_jobs(&self.jobs),
            &self.aggregator.snapshot(),
            self.gateway.context().reference,
        )
    }

    /// Clear stale results, then submit every work unit. Any failure aborts
    /// the run.
    pub async fn submit_all(&mut self) -> FleetResult<()> {
        if self.phase != RunPhase::Planning {
            return Err(FleetError::InvalidPlan(format!(
                "cannot submit a run in the {} phase",
                self.phase
            )));
        }
        self.aggregator.clear_stale_results().await?;
        self.phase = RunPhase::Submitting;

        let concurrency = self.gateway.context().submit_concurrency.max(1);
        tracing::info!(
            run = %self.plan.run_name,
            units = self.plan.len(),
            concurrency,
            "submitting work plan"
        );

        let gateway = &self.gateway;
        let mut jobs: Vec<SubmittedJob> = stream::iter(self.plan.iter())
            .map(|unit| async move {
                let job_id = gateway.submit(unit).await?;
                Ok::<_, FleetError>(SubmittedJob::new(unit.index, job_id))
            })
            .buffer_unordered(concurrency)
            .try_collect()
            .await?;
        jobs.sort_by_key(|job| job.work_unit_index);

        self.jobs = jobs;
        self.phase = RunPhase::Polling;

        tracing::info!(run = %self.plan.run_name, jobs = self.jobs.len(), "fleet submitted");
        self.broadcast(FleetEvent::FleetSubmitted {
            run_name: self.plan.run_name.clone(),
            jobs: self.jobs.len(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Run one polling iteration.
    ///
    /// Describes every non-terminal job, applies the observed states, folds
    /// the succeeded set and reports progress. A `QueryFailed` error leaves
    /// the run untouched so the iteration can simply be retried.
    pub async fn poll_once(&mut self) -> FleetResult<PollSnapshot> {
        match self.phase {
            RunPhase::Polling => {}
            RunPhase::Complete => {
                return Ok(PollSnapshot {
                    iteration: self.iteration,
                    report: self.report(),
                    fold: FoldSummary {
                        estimate: self.aggregator.snapshot(),
                        ..Default::default()
                    },
                    complete: true,
                });
            }
            phase => {
                return Err(FleetError::InvalidPlan(format!(
                    "cannot poll a run in the {phase} phase"
                )));
            }
        }

        self.iteration += 1;
        let pending: Vec<RemoteJobId> = self
            .jobs
            .iter()
            .filter(|job| !job.state.is_terminal())
            .map(|job| job.remote_job_id.clone())
            .collect();

        let states = match self.gateway.describe(&pending).await {
            Ok(states) => states,
            Err(e) => {
                self.broadcast(FleetEvent::PollFailed {
                    iteration: self.iteration,
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                return Err(e);
            }
        };

        let now = Utc::now();
        let mut changes = Vec::new();
        for job in self.jobs.iter_mut().filter(|job| !job.state.is_terminal()) {
            let Some(state) = states.get(&job.remote_job_id) else {
                tracing::debug!(job_id = %job.remote_job_id, "job missing from describe response");
                continue;
            };
            if let Some(old_state) = job.observe(*state) {
                changes.push(FleetEvent::JobStateChanged {
                    work_unit_index: job.work_unit_index,
                    remote_job_id: job.remote_job_id.clone(),
                    old_state,
                    new_state: *state,
                    timestamp: now,
                });
            }
        }
        for event in changes {
            self.broadcast(event);
        }

        let succeeded: Vec<SubmittedJob> = self
            .jobs
            .iter()
            .filter(|job| job.state == JobState::Succeeded)
            .cloned()
            .collect();
        let fold = self.aggregator.fold(&succeeded).await;
        self.broadcast_fold(&fold);

        let report = self.report();
        let complete = report.active() == 0;
        tracing::info!(
            iteration = self.iteration,
            active = report.active(),
            succeeded = report.counts.succeeded(),
            failed = report.counts.failed(),
            folded = report.chunks_complete,
            "poll complete"
        );
        self.broadcast(FleetEvent::Progress {
            iteration: self.iteration,
            report: report.clone(),
            timestamp: Utc::now(),
        });

        if complete {
            self.phase = RunPhase::Complete;
            tracing::info!(run = %self.plan.run_name, estimate = ?report.estimate, "fleet run complete");
            self.broadcast(FleetEvent::RunCompleted {
                run_name: self.plan.run_name.clone(),
                report: report.clone(),
                timestamp: Utc::now(),
            });
        }

        Ok(PollSnapshot {
            iteration: self.iteration,
            report,
            fold,
            complete,
        })
    }

    fn broadcast_fold(&self, fold: &FoldSummary) {
        let now = Utc::now();
        for unit in &fold.folded {
            self.broadcast(FleetEvent::UnitFolded {
                work_unit_index: unit.index,
                hits: unit.hits,
                iterations: unit.iterations,
                timestamp: now,
            });
        }
        for err in &fold.corrupt {
            if let FleetError::CorruptResult { index, reason, .. } = err {
                self.broadcast(FleetEvent::ResultCorrupt {
                    work_unit_index: *index,
                    reason: reason.clone(),
                    timestamp: now,
                });
            }
        }
    }
}

//! Fleet actor: drives the polling loop of one run on a fixed, cancellable
//! schedule.
//!
//! The actor handles one message at a time, so at most one `describe` cycle
//! is ever in flight and the aggregate is only mutated from here. Readers get
//! copies through [`FleetMessage::GetReport`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use fleet_core::{FleetError, FleetEvent, FleetResult, ProgressReport, SubmittedJob};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::messages::FleetMessage;
use crate::poller::{FleetRun, RunPhase};

/// How a run's polling loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// No job remained active.
    Complete,
    /// Polling was stopped from outside.
    Cancelled { reason: Option<String> },
}

/// Final state of a run handed back to the caller.
#[derive(Debug, Clone)]
pub struct FleetOutcome {
    pub run_name: String,
    pub termination: Termination,
    pub report: ProgressReport,
    pub jobs: Vec<SubmittedJob>,
    pub folded_unit_indices: BTreeSet<usize>,
}

impl FleetOutcome {
    fn from_run(run: &FleetRun, termination: Termination) -> Self {
        Self {
            run_name: run.run_name().to_string(),
            termination,
            report: run.report(),
            jobs: run.jobs().to_vec(),
            folded_unit_indices: run.aggregator().aggregate().folded_unit_indices().clone(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.termination == Termination::Complete
    }

    pub fn estimate(&self) -> Option<f64> {
        self.report.estimate
    }
}

/// State for the fleet actor.
pub struct FleetActorState {
    run: FleetRun,
    poll_interval: Duration,
    /// Timer task that will deliver the next `Poll`.
    pending_poll: Option<JoinHandle<()>>,
    completion: Option<oneshot::Sender<FleetResult<FleetOutcome>>>,
    /// Set as soon as a stop is requested, ahead of the `Stop` message.
    cancelled: Arc<AtomicBool>,
}

impl FleetActorState {
    fn schedule_poll(&mut self, myself: &ActorRef<FleetMessage>) {
        let myself = myself.clone();
        let delay = self.poll_interval;
        self.pending_poll = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = myself.send_message(FleetMessage::Poll);
        }));
    }

    fn cancel_pending_poll(&mut self) {
        if let Some(timer) = self.pending_poll.take() {
            timer.abort();
        }
    }

    fn finish(&mut self, result: FleetResult<FleetOutcome>) {
        self.cancel_pending_poll();
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(result);
        }
    }
}

/// Fleet actor arguments.
pub struct FleetArgs {
    pub run: FleetRun,
    pub completion: oneshot::Sender<FleetResult<FleetOutcome>>,
    pub cancelled: Arc<AtomicBool>,
}

/// Actor that owns a submitted [`FleetRun`] and polls it to completion.
pub struct FleetActor;

impl Actor for FleetActor {
    type Msg = FleetMessage;
    type State = FleetActorState;
    type Arguments = FleetArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        if args.run.phase() != RunPhase::Polling {
            return Err(ActorProcessingErr::from(format!(
                "fleet run '{}' is in the {} phase, expected polling",
                args.run.run_name(),
                args.run.phase()
            )));
        }

        tracing::info!("Starting fleet actor: {}", args.run.run_name());
        let poll_interval = args.run.poll_interval();

        // First poll runs immediately.
        myself.send_message(FleetMessage::Poll)?;

        Ok(FleetActorState {
            run: args.run,
            poll_interval,
            pending_poll: None,
            completion: Some(args.completion),
            cancelled: args.cancelled,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            FleetMessage::Poll => {
                state.pending_poll = None;
                // A poll queued before a stop request must not fold anything.
                if state.completion.is_none() || state.cancelled.load(Ordering::SeqCst) {
                    return Ok(());
                }

                match state.run.poll_once().await {
                    Ok(snapshot) if snapshot.complete => {
                        let outcome = FleetOutcome::from_run(&state.run, Termination::Complete);
                        state.finish(Ok(outcome));
                        myself.stop(None);
                    }
                    Ok(_) => state.schedule_poll(&myself),
                    Err(e) if !e.is_fatal() => {
                        tracing::warn!(
                            "Poll {} of {} failed, retrying in {:?}: {}",
                            state.run.iteration(),
                            state.run.run_name(),
                            state.poll_interval,
                            e
                        );
                        state.schedule_poll(&myself);
                    }
                    Err(e) => {
                        tracing::error!("Fleet run {} aborted: {}", state.run.run_name(), e);
                        state.finish(Err(e));
                        myself.stop(None);
                    }
                }
            }

            FleetMessage::GetReport { reply } => {
                let _ = reply.send(state.run.report());
            }

            FleetMessage::Stop { reason } => {
                state.cancelled.store(true, Ordering::SeqCst);
                tracing::info!(
                    "Stopping fleet run {}: {}",
                    state.run.run_name(),
                    reason.as_deref().unwrap_or("no reason")
                );
                state.run.broadcast(FleetEvent::RunCancelled {
                    run_name: state.run.run_name().to_string(),
                    reason: reason.clone(),
                    timestamp: Utc::now(),
                });
                let outcome = FleetOutcome::from_run(&state.run, Termination::Cancelled { reason });
                state.finish(Ok(outcome));
                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if state.completion.is_some() {
            let outcome = FleetOutcome::from_run(
                &state.run,
                Termination::Cancelled {
                    reason: Some("fleet actor stopped".to_string()),
                },
            );
            state.finish(Ok(outcome));
        } else {
            state.cancel_pending_poll();
        }
        Ok(())
    }
}

/// Cloneable stop switch for a running fleet.
#[derive(Clone)]
pub struct FleetStopper {
    actor: ActorRef<FleetMessage>,
    cancelled: Arc<AtomicBool>,
}

impl FleetStopper {
    /// Request a graceful stop; the outcome then reports `Cancelled`.
    ///
    /// Polls already waiting in the mailbox are skipped.
    pub fn stop(&self, reason: Option<String>) {
        self.cancelled.store(true, Ordering::SeqCst);
        if self
            .actor
            .send_message(FleetMessage::Stop { reason })
            .is_err()
        {
            tracing::debug!("fleet actor already stopped");
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Handle to a running fleet poll loop.
pub struct FleetHandle {
    actor: ActorRef<FleetMessage>,
    stopper: FleetStopper,
    join: JoinHandle<()>,
    outcome: oneshot::Receiver<FleetResult<FleetOutcome>>,
}

impl FleetHandle {
    pub fn actor(&self) -> &ActorRef<FleetMessage> {
        &self.actor
    }

    pub fn stopper(&self) -> FleetStopper {
        self.stopper.clone()
    }

    /// Request a graceful stop; the outcome then reports `Cancelled`.
    pub fn stop(&self, reason: Option<String>) {
        self.stopper.stop(reason);
    }

    /// Get a copy of the current progress.
    pub async fn report(&self, timeout: Duration) -> FleetResult<ProgressReport> {
        let result = ractor::rpc::call(
            &self.actor,
            |reply| FleetMessage::GetReport { reply },
            Some(timeout),
        )
        .await
        .map_err(|e| FleetError::Actor(e.to_string()))?;

        match result {
            ractor::rpc::CallResult::Success(report) => Ok(report),
            ractor::rpc::CallResult::Timeout => {
                Err(FleetError::Actor("timed out waiting for report".into()))
            }
            ractor::rpc::CallResult::SenderError => {
                Err(FleetError::Actor("fleet actor dropped the report request".into()))
            }
        }
    }

    /// Wait for the run to complete or be cancelled.
    pub async fn wait(self) -> FleetResult<FleetOutcome> {
        let result = self
            .outcome
            .await
            .map_err(|_| FleetError::Actor("fleet actor exited without an outcome".into()))?;
        if let Err(e) = self.join.await {
            tracing::warn!("fleet actor task ended abnormally: {}", e);
        }
        result
    }
}

/// Start the polling loop for a run whose fleet is already submitted.
pub async fn start_fleet(run: FleetRun) -> FleetResult<FleetHandle> {
    let (tx, rx) = oneshot::channel();
    let cancelled = Arc::new(AtomicBool::new(false));
    let args = FleetArgs {
        run,
        completion: tx,
        cancelled: cancelled.clone(),
    };

    let (actor, join) = Actor::spawn(None, FleetActor, args)
        .await
        .map_err(|e| FleetError::Actor(format!("failed to spawn fleet actor: {e}")))?;

    Ok(FleetHandle {
        stopper: FleetStopper {
            actor: actor.clone(),
            cancelled,
        },
        actor,
        join,
        outcome: rx,
    })
}

/// Submit the whole plan, then start polling it.
///
/// Submission errors are returned before any polling starts.
pub async fn launch_fleet(mut run: FleetRun) -> FleetResult<FleetHandle> {
    run.submit_all().await?;
    start_fleet(run).await
}

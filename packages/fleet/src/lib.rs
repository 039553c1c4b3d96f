//! Fleet orchestration for distributed Monte Carlo estimation.
//!
//! This crate submits a work plan to a remote job queue, polls the fleet to
//! completion and folds each unit's partial result into a running estimate.
//!
//! # Architecture
//!
//! - `FleetGateway` - Submits units and describes jobs in bounded batches
//! - `ResultAggregator` - Folds succeeded units exactly once
//! - `FleetRun` - Submit-then-poll state machine for one run
//! - `FleetActor` - Ractor actor polling a run on a cancellable schedule
//!
//! # Usage
//!
//! ```ignore
//! use fleet::{FleetGateway, FleetRun, RunContext, launch_fleet};
//!
//! let ctx = Arc::new(RunContext::new("pi-run", "queue", "definition"));
//! let gateway = FleetGateway::new(client, ctx);
//! let run = FleetRun::new(plan, gateway, storage);
//!
//! let handle = launch_fleet(run).await?;
//! let outcome = handle.wait().await?;
//! ```

mod aggregator;
mod client;
mod context;
mod fleet_actor;
mod gateway;
mod http_client;
mod messages;
mod poller;

pub use aggregator::{
    ClearFuture, FoldSummary, FoldedUnit, ResultAggregator, ResultSource, SourceFuture,
};
pub use client::{ClientError, ClientFuture, JobDescription, QueueClient, SubmitJobRequest};
pub use context::RunContext;
pub use fleet_actor::{
    FleetActor, FleetHandle, FleetOutcome, FleetStopper, Termination, launch_fleet, start_fleet,
};
pub use gateway::{DESCRIBE_BATCH_LIMIT, FleetGateway};
pub use http_client::HttpQueueClient;
pub use messages::FleetMessage;
pub use poller::{FleetRun, PollSnapshot, RunPhase};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef};

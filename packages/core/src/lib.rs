//! Core domain types for the Monte Carlo fleet orchestrator.
//!
//! This crate contains the pieces shared by every package:
//! - WorkUnit and WorkPlan construction
//! - JobState and SubmittedJob for the remote fleet
//! - AggregateEstimate for the running result
//! - ProgressReport rendering and FleetEvent for observers

mod config;
mod error;
mod estimate;
mod events;
mod job;
mod plan;
mod report;

pub use config::{ConfigError, SimConfig};
pub use error::{FleetError, FleetResult};
pub use estimate::{AggregateEstimate, EstimateSnapshot};
pub use events::FleetEvent;
pub use job::{JobState, RemoteJobId, StateCounts, SubmittedJob, UnknownJobState};
pub use plan::{
    DEFAULT_MAX_CHUNKS, PlanBuilder, SeedRange, SeedSource, WorkPlan, WorkUnit, result_locator,
};
pub use report::{ProgressReport, render};

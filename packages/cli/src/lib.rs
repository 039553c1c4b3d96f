//! `fleet-run`: estimate a constant with a fleet of Monte Carlo jobs.
//!
//! ## Configuration
//!
//! Flags fall back to environment variables:
//!
//! - `FLEET_QUEUE_URL` - queue service endpoint
//! - `FLEET_QUEUE` - queue the jobs are submitted to
//! - `FLEET_JOB_DEFINITION` - job definition each unit runs
//! - `FLEET_RESULTS_URI_BASE` - base URI units write their results under
//!
//! The result store is configured through `RESULTS_*` variables, see
//! `storage::StorageConfig::from_env`.

#![allow(clippy::print_stdout)]

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use fleet::{
    FleetGateway, FleetOutcome, FleetRun, HttpQueueClient, RunContext, Termination, launch_fleet,
};
use fleet_core::{DEFAULT_MAX_CHUNKS, FleetEvent, PlanBuilder, SimConfig};
use storage::Storage;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

/// Exit code used when the run is interrupted.
pub const EXIT_CANCELLED: u8 = 130;

/// How long the progress printer gets to drain once the run is over.
const PRINTER_DRAIN: Duration = Duration::from_secs(2);

/// Run a distributed Monte Carlo estimation.
#[derive(Debug, Parser)]
#[command(name = "fleet-run")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the JSON simulation config.
    pub config: PathBuf,

    /// Name of this run; prefixes job names and result keys.
    #[arg(long)]
    pub run_name: Option<String>,

    /// Draw random seeds instead of using the configured ones.
    #[arg(long)]
    pub random_seeds: bool,

    /// Queue service endpoint.
    #[arg(long, env = "FLEET_QUEUE_URL", default_value = "http://localhost:8080")]
    pub queue_url: String,

    /// Queue the jobs are submitted to.
    #[arg(long, env = "FLEET_QUEUE", default_value = "monte-carlo")]
    pub queue: String,

    /// Job definition each unit runs.
    #[arg(long, env = "FLEET_JOB_DEFINITION", default_value = "pi-sampler")]
    pub job_definition: String,

    /// Base URI prepended to result keys in job parameters.
    #[arg(long, env = "FLEET_RESULTS_URI_BASE")]
    pub results_uri_base: Option<String>,

    /// Seconds between polling iterations.
    #[arg(long, default_value_t = 10)]
    pub poll_interval_secs: u64,

    /// Maximum concurrent submissions.
    #[arg(long, default_value_t = 1)]
    pub submit_concurrency: usize,

    /// Ceiling on the number of chunks in a plan.
    #[arg(long, default_value_t = DEFAULT_MAX_CHUNKS)]
    pub max_chunks: usize,
}

impl Cli {
    /// Run name from the flag, or a fresh `pi-<ulid>`.
    pub fn run_name(&self) -> String {
        self.run_name
            .clone()
            .unwrap_or_else(|| format!("pi-{}", ulid::Ulid::new().to_string().to_lowercase()))
    }

    pub fn context(&self, run_name: &str) -> RunContext {
        let mut ctx = RunContext::new(run_name, &self.queue, &self.job_definition)
            .with_poll_interval(Duration::from_secs(self.poll_interval_secs))
            .with_submit_concurrency(self.submit_concurrency);
        if let Some(base) = &self.results_uri_base {
            ctx = ctx.with_results_uri_base(base);
        }
        ctx
    }
}

/// Initialize tracing from `FLEET_LOG`, then `RUST_LOG`, then `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("FLEET_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Plan, submit and poll a run to completion.
pub async fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = SimConfig::load(&cli.config)?;
    config.validate(cli.random_seeds)?;

    let run_name = cli.run_name();
    let plan = PlanBuilder::new(&run_name)
        .with_max_chunks(cli.max_chunks)
        .build(
            config.chunks,
            config.iterations_per_chunk,
            config.seed_source(cli.random_seeds),
        )?;

    let storage = Storage::from_env()
        .await
        .context("failed to open result store")?;
    let client = HttpQueueClient::new(&cli.queue_url)?;
    let ctx = Arc::new(cli.context(&run_name));

    tracing::info!(
        run = %run_name,
        chunks = plan.len(),
        iterations = plan.total_iterations(),
        store = storage.kind_str(),
        "starting fleet run"
    );

    let (event_tx, event_rx) = broadcast::channel(1024);
    let printer = tokio::spawn(print_events(event_rx, std::io::stdout()));

    let gateway = FleetGateway::new(Arc::new(client), ctx);
    let run = FleetRun::new(Arc::new(plan), gateway, Arc::new(storage)).with_event_tx(event_tx);

    let handle = launch_fleet(run).await?;

    let stopper = handle.stopper();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.stop(Some("interrupted".to_string()));
        }
    });

    let outcome = handle.wait().await?;
    // The actor dropped its event sender on exit, so the printer ends once
    // it has written the last frames.
    finish_printer(printer, PRINTER_DRAIN).await;
    print_outcome(&outcome);

    Ok(match outcome.termination {
        Termination::Complete => ExitCode::SUCCESS,
        Termination::Cancelled { .. } => ExitCode::from(EXIT_CANCELLED),
    })
}

async fn print_events<W: Write>(mut rx: broadcast::Receiver<FleetEvent>, mut out: W) -> W {
    loop {
        match rx.recv().await {
            Ok(FleetEvent::Progress { report, .. }) => {
                if let Err(e) = writeln!(out, "{report}\n") {
                    tracing::debug!("failed to print progress: {e}");
                }
            }
            Ok(event @ (FleetEvent::ResultCorrupt { .. } | FleetEvent::PollFailed { .. })) => {
                tracing::warn!("{}", event.description());
            }
            Ok(event) => tracing::debug!("{}", event.description()),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "progress printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    let _ = out.flush();
    out
}

/// Wait for the printer to drain, giving up after `timeout`.
async fn finish_printer<W>(printer: JoinHandle<W>, timeout: Duration) -> Option<W> {
    match tokio::time::timeout(timeout, printer).await {
        Ok(Ok(out)) => Some(out),
        Ok(Err(e)) => {
            tracing::debug!("progress printer failed: {e}");
            None
        }
        Err(_) => {
            tracing::debug!("progress printer did not drain in {timeout:?}");
            None
        }
    }
}

fn print_outcome(outcome: &FleetOutcome) {
    let report = &outcome.report;
    match outcome.termination {
        Termination::Complete => println!("Complete"),
        Termination::Cancelled { .. } => println!("Cancelled (partial result)"),
    }
    match (report.estimate, report.delta) {
        (Some(estimate), Some(delta)) => {
            println!("Final estimate: {estimate:.9} (delta {delta:+.9})");
        }
        _ => println!("Final estimate: n/a"),
    }
    println!(
        "Folded iterations: {} across {} chunks",
        report.total_iterations, report.chunks_complete
    );
}

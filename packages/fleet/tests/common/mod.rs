#![allow(dead_code, clippy::disallowed_methods)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fleet::{
    ClientError, ClientFuture, FleetGateway, FleetHandle, FleetRun, JobDescription, QueueClient,
    RunContext, SubmitJobRequest, launch_fleet,
};
use fleet_core::{FleetResult, JobState, PlanBuilder, SeedSource, WorkPlan};
use storage::{Storage, StorageConfig};

type Script = Box<dyn Fn(usize) -> Vec<JobState> + Send + Sync>;

/// A job the mock accepted.
struct MockJob {
    name: String,
    index: usize,
    locator: String,
    timeline: VecDeque<JobState>,
    uploaded: bool,
}

#[derive(Default)]
struct MockState {
    submitted: Vec<SubmitJobRequest>,
    submit_calls: usize,
    jobs: HashMap<String, MockJob>,
    describe_batches: Vec<Vec<String>>,
    describe_calls: usize,
}

/// Scripted in-process queue service.
///
/// Every job follows the timeline its script returns for the unit index; each
/// describe call advances it by one step and the last state repeats. When a
/// store is attached, a job uploads its hit count the first time it is
/// described as succeeded, like a real sampling job finishing.
pub struct MockQueue {
    script: Script,
    fail_submit_for: Option<usize>,
    fail_describe_calls: HashSet<usize>,
    store: Option<Storage>,
    hits: HashMap<usize, u64>,
    state: Mutex<MockState>,
}

impl MockQueue {
    pub fn new(script: impl Fn(usize) -> Vec<JobState> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            fail_submit_for: None,
            fail_describe_calls: HashSet::new(),
            store: None,
            hits: HashMap::new(),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Every job walks the happy path and succeeds.
    pub fn succeeding() -> Self {
        Self::new(|_| {
            vec![
                JobState::Runnable,
                JobState::Running,
                JobState::Succeeded,
            ]
        })
    }

    pub fn fail_submit_for(mut self, index: usize) -> Self {
        self.fail_submit_for = Some(index);
        self
    }

    /// Fail the n-th describe call (1-based).
    pub fn fail_describe_call(mut self, call: usize) -> Self {
        self.fail_describe_calls.insert(call);
        self
    }

    /// Succeeded jobs write these hit counts to `store`; units not listed
    /// upload nothing.
    pub fn uploading(mut self, store: &Storage, hits: &[(usize, u64)]) -> Self {
        self.store = Some(store.clone());
        self.hits = hits.iter().copied().collect();
        self
    }

    pub fn submitted(&self) -> Vec<SubmitJobRequest> {
        self.state.lock().unwrap().submitted.clone()
    }

    /// Every submit call, accepted or not.
    pub fn submit_calls(&self) -> usize {
        self.state.lock().unwrap().submit_calls
    }

    pub fn describe_batches(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().describe_batches.clone()
    }

    pub fn describe_calls(&self) -> usize {
        self.state.lock().unwrap().describe_calls
    }
}

/// Split a `{run}-{index}` job name.
fn split_name(name: &str) -> (&str, usize) {
    match name.rsplit_once('-') {
        Some((run, index)) => (run, index.parse().unwrap_or_default()),
        None => (name, 0),
    }
}

impl QueueClient for MockQueue {
    fn submit_job(&self, request: SubmitJobRequest) -> ClientFuture<'_, String> {
        let (run, index) = split_name(&request.name);
        let mut state = self.state.lock().unwrap();
        state.submit_calls += 1;
        let result = if self.fail_submit_for == Some(index) {
            Err(ClientError::Status {
                status: 429,
                body: "too many requests".into(),
            })
        } else {
            let job_id = format!("job-{:04}", state.submitted.len());
            let job = MockJob {
                name: request.name.clone(),
                index,
                locator: format!("{run}/{index}"),
                timeline: (self.script)(index).into(),
                uploaded: false,
            };
            state.jobs.insert(job_id.clone(), job);
            state.submitted.push(request);
            Ok(job_id)
        };
        Box::pin(async move { result })
    }

    fn describe_jobs(&self, job_ids: Vec<String>) -> ClientFuture<'_, Vec<JobDescription>> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.describe_calls += 1;
        let mut uploads = Vec::new();
        let result = if self.fail_describe_calls.contains(&state.describe_calls) {
            Err(ClientError::Transport("connection reset".into()))
        } else {
            assert!(job_ids.len() <= fleet::DESCRIBE_BATCH_LIMIT);
            state.describe_batches.push(job_ids.clone());
            let mut jobs = Vec::new();
            for id in job_ids {
                let Some(job) = state.jobs.get_mut(&id) else {
                    continue;
                };
                let next = if job.timeline.len() > 1 {
                    job.timeline.pop_front()
                } else {
                    job.timeline.front().copied()
                };
                let status = next.unwrap_or(JobState::Submitted);
                if status == JobState::Succeeded && !job.uploaded {
                    job.uploaded = true;
                    if let Some(hits) = self.hits.get(&job.index) {
                        uploads.push((job.locator.clone(), *hits));
                    }
                }
                jobs.push(JobDescription {
                    job_id: id,
                    name: job.name.clone(),
                    status: status.as_str().to_string(),
                });
            }
            Ok(jobs)
        };
        drop(guard);

        let store = self.store.clone();
        Box::pin(async move {
            if let Some(store) = store {
                for (locator, hits) in uploads {
                    store.put_hit_count(&locator, hits).await.unwrap();
                }
            }
            result
        })
    }
}

pub fn plan(run_name: &str, chunks: usize, iterations: u64) -> WorkPlan {
    PlanBuilder::new(run_name)
        .build(chunks, iterations, SeedSource::explicit(0..chunks as u64))
        .unwrap()
}

pub fn context(run_name: &str) -> Arc<RunContext> {
    Arc::new(
        RunContext::new(run_name, "pi-queue", "pi-sampler:1")
            .with_results_uri_base("s3://results")
            .with_poll_interval(Duration::from_secs(5)),
    )
}

pub async fn empty_store() -> Storage {
    Storage::new(StorageConfig::memory()).await.unwrap()
}

pub async fn store_with_hits(run_name: &str, hits: &[(usize, u64)]) -> Storage {
    let storage = empty_store().await;
    for (index, count) in hits {
        storage
            .put_hit_count(&format!("{run_name}/{index}"), *count)
            .await
            .unwrap();
    }
    storage
}

pub fn fleet_run(
    plan: WorkPlan,
    ctx: Arc<RunContext>,
    queue: Arc<MockQueue>,
    storage: Storage,
) -> FleetRun {
    let gateway = FleetGateway::new(queue, ctx);
    FleetRun::new(Arc::new(plan), gateway, Arc::new(storage))
}

/// Build a plan with `builder` and launch it against the mock queue.
pub async fn launch_planned(
    builder: PlanBuilder,
    chunks: usize,
    queue: Arc<MockQueue>,
    storage: Storage,
) -> FleetResult<FleetHandle> {
    let plan = builder.build(chunks, 100, SeedSource::randomized())?;
    let ctx = context(&plan.run_name);
    launch_fleet(fleet_run(plan, ctx, queue, storage)).await
}

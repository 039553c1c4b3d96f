//! Result aggregation: folds each succeeded unit's partial result exactly once.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use fleet_core::{
    AggregateEstimate, EstimateSnapshot, FleetError, FleetResult, JobState, SubmittedJob,
    WorkPlan,
};
use storage::{Storage, StorageError};

/// Future type for result reads.
pub type SourceFuture<'a> = Pin<Box<dyn Future<Output = Result<u64, StorageError>> + Send + 'a>>;

/// Future type for clearing a run's results.
pub type ClearFuture<'a> = Pin<Box<dyn Future<Output = Result<usize, StorageError>> + Send + 'a>>;

/// Access to the partial results written by work units.
pub trait ResultSource: Send + Sync + 'static {
    /// Fetch and decode the hit count stored at `locator`.
    fn read_hit_count<'a>(&'a self, locator: &'a str) -> SourceFuture<'a>;

    /// Remove every result stored under `run_name`, returning how many were removed.
    fn clear_results<'a>(&'a self, run_name: &'a str) -> ClearFuture<'a>;
}

impl ResultSource for Storage {
    fn read_hit_count<'a>(&'a self, locator: &'a str) -> SourceFuture<'a> {
        Box::pin(self.get_hit_count(locator))
    }

    fn clear_results<'a>(&'a self, run_name: &'a str) -> ClearFuture<'a> {
        Box::pin(self.delete_prefix(run_name))
    }
}

/// A unit incorporated by one call to [`ResultAggregator::fold`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldedUnit {
    pub index: usize,
    pub hits: u64,
    pub iterations: u64,
}

/// Outcome of one fold pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FoldSummary {
    /// Units folded during this pass.
    pub folded: Vec<FoldedUnit>,
    /// Units whose result could not be used; they stay unfolded.
    pub corrupt: Vec<FleetError>,
    /// Aggregate totals after the pass.
    pub estimate: EstimateSnapshot,
}

/// Owns the run's [`AggregateEstimate`].
pub struct ResultAggregator {
    plan: Arc<WorkPlan>,
    source: Arc<dyn ResultSource>,
    estimate: AggregateEstimate,
}

impl ResultAggregator {
    pub fn new(plan: Arc<WorkPlan>, source: Arc<dyn ResultSource>) -> Self {
        Self {
            plan,
            source,
            estimate: AggregateEstimate::new(),
        }
    }

    pub fn aggregate(&self) -> &AggregateEstimate {
        &self.estimate
    }

    pub fn snapshot(&self) -> EstimateSnapshot {
        self.estimate.snapshot()
    }

    pub fn estimate(&self) -> Option<f64> {
        self.estimate.estimate()
    }

    /// Empty the run's result locations so results left by an earlier run of
    /// the same name are never folded.
    pub async fn clear_stale_results(&self) -> FleetResult<usize> {
        let run_name = &self.plan.run_name;
        let removed = self
            .source
            .clear_results(run_name)
            .await
            .map_err(|e| FleetError::ResultStore(format!("failed to clear {run_name}/: {e}")))?;
        if removed > 0 {
            tracing::info!(run = %run_name, removed, "cleared stale results");
        }
        Ok(removed)
    }

    /// Fold every succeeded job not yet in the aggregate.
    ///
    /// Jobs already folded are skipped, so the full succeeded set may be
    /// passed on every polling iteration. Missing or malformed results are
    /// logged, reported in the summary and left out of the totals.
    pub async fn fold<'a, I>(&mut self, jobs: I) -> FoldSummary
    where
        I: IntoIterator<Item = &'a SubmittedJob>,
    {
        let mut summary = FoldSummary::default();

        for job in jobs {
            if job.state != JobState::Succeeded || self.estimate.is_folded(job.work_unit_index) {
                continue;
            }

            let Some(unit) = self.plan.unit(job.work_unit_index) else {
                let err = FleetError::CorruptResult {
                    index: job.work_unit_index,
                    locator: String::new(),
                    reason: format!("job {} does not belong to the plan", job.remote_job_id),
                };
                tracing::warn!("{err}");
                summary.corrupt.push(err);
                continue;
            };

            match self.source.read_hit_count(&unit.result_locator).await {
                Ok(hits) => {
                    if self.estimate.fold_unit(unit.index, unit.iterations, hits) {
                        tracing::debug!(index = unit.index, hits, "folded work unit");
                        summary.folded.push(FoldedUnit {
                            index: unit.index,
                            hits,
                            iterations: unit.iterations,
                        });
                    }
                }
                Err(e) => {
                    let err = FleetError::CorruptResult {
                        index: unit.index,
                        locator: unit.result_locator.clone(),
                        reason: e.to_string(),
                    };
                    tracing::warn!("{err}");
                    summary.corrupt.push(err);
                }
            }
        }

        summary.estimate = self.estimate.snapshot();
        summary
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use fleet_core::{PlanBuilder, RemoteJobId, SeedSource};

    use super::*;

    struct MapSource(HashMap<String, Result<u64, String>>);

    impl ResultSource for MapSource {
        fn read_hit_count<'a>(&'a self, locator: &'a str) -> SourceFuture<'a> {
            let result = match self.0.get(locator) {
                Some(Ok(hits)) => Ok(*hits),
                Some(Err(reason)) => Err(StorageError::Malformed {
                    key: locator.to_string(),
                    reason: reason.clone(),
                }),
                None => Err(StorageError::NotFound(locator.to_string())),
            };
            Box::pin(async move { result })
        }

        fn clear_results<'a>(&'a self, _run_name: &'a str) -> ClearFuture<'a> {
            Box::pin(async { Ok(0) })
        }
    }

    fn succeeded(index: usize) -> SubmittedJob {
        let mut job = SubmittedJob::new(index, RemoteJobId::new(format!("job-{index}")));
        job.observe(JobState::Succeeded);
        job
    }

    fn aggregator(results: &[(usize, Result<u64, String>)]) -> ResultAggregator {
        let plan = PlanBuilder::new("run")
            .build(4, 1000, SeedSource::explicit([1, 2, 3, 4]))
            .unwrap();
        let source = MapSource(
            results
                .iter()
                .map(|(i, r)| (format!("run/{i}"), r.clone()))
                .collect(),
        );
        ResultAggregator::new(Arc::new(plan), Arc::new(source))
    }

    #[tokio::test]
    async fn skips_jobs_that_have_not_succeeded() {
        let mut agg = aggregator(&[(0, Ok(10))]);
        let mut running = SubmittedJob::new(0, RemoteJobId::new("job-0"));
        running.observe(JobState::Running);

        let summary = agg.fold([&running]).await;
        assert!(summary.folded.is_empty());
        assert_eq!(summary.estimate, EstimateSnapshot::default());
    }

    #[tokio::test]
    async fn malformed_result_is_reported_and_retried_later() {
        let mut agg = aggregator(&[(0, Err("garbage".into())), (1, Ok(5))]);
        let jobs = [succeeded(0), succeeded(1)];

        let summary = agg.fold(&jobs).await;
        assert_eq!(summary.folded.len(), 1);
        assert_eq!(summary.corrupt.len(), 1);
        assert!(matches!(
            summary.corrupt[0],
            FleetError::CorruptResult { index: 0, .. }
        ));
        assert!(!agg.aggregate().is_folded(0));

        // Still unreadable on the next pass: reported again, never counted.
        let again = agg.fold(&jobs).await;
        assert!(again.folded.is_empty());
        assert_eq!(again.corrupt.len(), 1);
        assert_eq!(again.estimate.total_iterations, 1000);
    }

    #[tokio::test]
    async fn job_outside_the_plan_is_corrupt() {
        let mut agg = aggregator(&[]);
        let summary = agg.fold([&succeeded(17)]).await;
        assert!(matches!(
            summary.corrupt.as_slice(),
            [FleetError::CorruptResult { index: 17, .. }]
        ));
    }
}

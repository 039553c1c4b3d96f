#![allow(clippy::disallowed_methods)]

mod common;

use std::sync::Arc;

use common::{plan, store_with_hits};
use fleet::ResultAggregator;
use fleet_core::{JobState, RemoteJobId, SubmittedJob};

const HITS: [(usize, u64); 6] = [(0, 3141), (1, 3142), (2, 3140), (3, 3143), (4, 3139), (5, 3150)];

fn succeeded_jobs(indices: &[usize]) -> Vec<SubmittedJob> {
    indices
        .iter()
        .map(|index| {
            let mut job = SubmittedJob::new(*index, RemoteJobId::new(format!("job-{index}")));
            job.observe(JobState::Succeeded);
            job
        })
        .collect()
}

async fn aggregator() -> ResultAggregator {
    let storage = store_with_hits("agg", &HITS).await;
    ResultAggregator::new(Arc::new(plan("agg", 6, 1000)), Arc::new(storage))
}

#[tokio::test]
async fn fold_is_idempotent() {
    let jobs = succeeded_jobs(&[0, 1, 2, 3]);

    let mut once = aggregator().await;
    once.fold(&jobs).await;

    let mut twice = aggregator().await;
    let first = twice.fold(&jobs).await;
    let second = twice.fold(&jobs).await;

    assert_eq!(first.folded.len(), 4);
    assert!(second.folded.is_empty());
    assert_eq!(once.aggregate(), twice.aggregate());
    assert_eq!(twice.aggregate().total_hits(), 12566);
    assert_eq!(twice.aggregate().total_iterations(), 4000);
    assert_eq!(twice.estimate(), Some(4.0 * 4000.0 / 12566.0));
}

#[tokio::test]
async fn fold_is_order_independent() {
    let orders: [&[usize]; 4] = [
        &[0, 1, 2, 3, 4, 5],
        &[5, 4, 3, 2, 1, 0],
        &[2, 5, 0, 3, 1, 4],
        &[3, 0, 4, 1, 5, 2],
    ];

    let mut reference = aggregator().await;
    reference.fold(&succeeded_jobs(orders[0])).await;

    for order in &orders[1..] {
        let mut agg = aggregator().await;
        agg.fold(&succeeded_jobs(order)).await;
        assert_eq!(agg.aggregate(), reference.aggregate());
    }
}

#[tokio::test]
async fn growing_succeeded_set_folds_only_new_units() {
    let mut agg = aggregator().await;

    let first = agg.fold(&succeeded_jobs(&[1, 4])).await;
    assert_eq!(first.estimate.folded_units, 2);

    let second = agg.fold(&succeeded_jobs(&[1, 4, 0])).await;
    let folded: Vec<usize> = second.folded.iter().map(|u| u.index).collect();
    assert_eq!(folded, vec![0]);
    assert_eq!(second.estimate.total_iterations, 3000);
    assert_eq!(second.estimate.total_hits, 3142 + 3139 + 3141);
}

#[tokio::test]
async fn missing_result_leaves_the_rest_folded() {
    let storage = store_with_hits("agg", &HITS[..3]).await;
    let mut agg = ResultAggregator::new(Arc::new(plan("agg", 4, 1000)), Arc::new(storage));

    let summary = agg.fold(&succeeded_jobs(&[0, 1, 2, 3])).await;

    assert_eq!(summary.folded.len(), 3);
    assert_eq!(summary.corrupt.len(), 1);
    assert_eq!(
        agg.aggregate().folded_unit_indices().iter().copied().collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(agg.aggregate().total_iterations(), 3000);
}

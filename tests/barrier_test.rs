//! Barrier correctness: batches finishing in random order still produce exactly
//! one aggregation with the right totals.

mod common;

use async_trait::async_trait;
use common::*;
use contact_enrichment::constants::events;
use contact_enrichment::database::{InMemoryJobStore, JobStore};
use contact_enrichment::events::EventPublisher;
use contact_enrichment::models::{BatchResult, NewJob};
use contact_enrichment::orchestration::{
    BatchExecutor, BatchSplitter, BatchWorkUnit, JobOrchestrator, RetryPolicy, TokioDispatcher,
};
use contact_enrichment::staging::{FilesystemStaging, InputStaging};
use contact_enrichment::state_machine::ProcessingState;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Finishes each batch after a shuffled delay; batches whose number is in
/// `failing` report one failed contact
struct ShuffledExecutor {
    delays_ms: HashMap<i32, u64>,
    failing: Vec<i32>,
    completion_order: Mutex<Vec<i32>>,
}

impl ShuffledExecutor {
    fn new(batch_count: i32, failing: Vec<i32>) -> Self {
        let mut delays: Vec<u64> = (0..batch_count as u64).map(|n| n * 3).collect();
        delays.shuffle(&mut rand::rng());
        Self {
            delays_ms: (0..batch_count).zip(delays).collect(),
            failing,
            completion_order: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl BatchExecutor for ShuffledExecutor {
    async fn execute(&self, unit: BatchWorkUnit) -> BatchResult {
        let delay = self.delays_ms.get(&unit.batch_number).copied().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.completion_order.lock().push(unit.batch_number);

        let failed = i64::from(self.failing.contains(&unit.batch_number));
        BatchResult {
            batch_id: unit.batch_id,
            processed: unit.total_count,
            success: unit.total_count - failed,
            failed,
            error_contact_ids: Vec::new(),
        }
    }

    async fn abandon(&self, unit: BatchWorkUnit, _reason: &str) -> BatchResult {
        BatchResult {
            batch_id: unit.batch_id,
            processed: unit.total_count,
            success: 0,
            failed: unit.total_count,
            error_contact_ids: Vec::new(),
        }
    }
}

struct ShuffledRun {
    job_id: i64,
    store: Arc<InMemoryJobStore>,
    event_names: Vec<String>,
    executor: Arc<ShuffledExecutor>,
}

async fn run_shuffled(rows: usize, batch_size: usize, failing: Vec<i32>) -> ShuffledRun {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryJobStore::new());
    let staging = Arc::new(FilesystemStaging::new(dir.path()));
    let events = EventPublisher::default();
    let mut receiver = events.subscribe();

    let batch_count = rows.div_ceil(batch_size) as i32;
    let executor = Arc::new(ShuffledExecutor::new(batch_count, failing));
    let dispatcher = Arc::new(TokioDispatcher::new(
        executor.clone(),
        batch_count.max(1) as usize,
        Duration::from_secs(5),
        events.clone(),
    ));
    let orchestrator = JobOrchestrator::new(
        store.clone(),
        staging.clone(),
        dispatcher,
        BatchSplitter::new(batch_size).unwrap(),
        RetryPolicy::none(),
        events,
    );

    let job = store
        .create_job(NewJob {
            filename: "contacts.csv".into(),
            total_count: rows as i64,
        })
        .await
        .unwrap();
    let staged = staging.stage(job.job_id, &numbered_csv(rows)).await.unwrap();

    orchestrator.run(job.job_id, staged).wait().await.unwrap();

    let event_names = drain_events(&mut receiver)
        .into_iter()
        .map(|e| e.name)
        .collect();
    ShuffledRun {
        job_id: job.job_id,
        store,
        event_names,
        executor,
    }
}

#[tokio::test]
async fn test_random_completion_order_aggregates_once() {
    for _ in 0..5 {
        let ShuffledRun {
            job_id,
            store,
            event_names: names,
            executor,
        } = run_shuffled(17, 2, vec![]).await;

        assert_eq!(executor.completion_order.lock().len(), 9);
        assert_eq!(
            names.iter().filter(|n| *n == events::JOB_COMPLETED).count(),
            1
        );
        assert_eq!(names.iter().filter(|n| *n == events::JOB_FAILED).count(), 0);

        let job = store.find_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, ProcessingState::Success);
        assert_eq!(job.success_count, 17);
        assert_eq!(job.failure_count, 0);
    }
}

#[tokio::test]
async fn test_failed_batches_in_random_order_fail_job() {
    let run = run_shuffled(10, 3, vec![0, 3]).await;
    let (job_id, store, names) = (run.job_id, run.store, run.event_names);

    let job = store.find_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, ProcessingState::Failed);
    assert_eq!(job.success_count, 8);
    assert_eq!(job.failure_count, 2);
    assert_eq!(job.success_count + job.failure_count, job.total_count);
    assert_eq!(names.iter().filter(|n| *n == events::JOB_FAILED).count(), 1);
}

#[tokio::test]
async fn test_aggregation_is_not_repeated_for_a_finished_job() {
    let ShuffledRun { job_id, store, .. } = run_shuffled(4, 2, vec![]).await;
    let aggregator = contact_enrichment::orchestration::Aggregator::new(
        store.clone(),
        EventPublisher::default(),
    );

    let replay = aggregator
        .aggregate(
            job_id,
            &[BatchResult {
                batch_id: 1,
                processed: 4,
                success: 0,
                failed: 4,
                error_contact_ids: vec![],
            }],
        )
        .await;
    assert!(replay.is_err());

    let job = store.find_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, ProcessingState::Success);
    assert_eq!(job.success_count, 4);
}

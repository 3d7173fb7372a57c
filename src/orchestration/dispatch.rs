//! # Work Dispatch
//!
//! Fan-out/fan-in plumbing between the orchestrator and batch workers.
//!
//! ```text
//! submit(unit) → tokio::spawn → [Semaphore] → timeout(catch_unwind(execute)) → BatchResult
//!                                                  │ timeout / panic
//!                                                  └→ abandon(unit, reason) → BatchResult
//! barrier(handles) → one BatchResult per submitted unit, in completion order
//! ```
//!
//! The barrier never yields fewer results than units submitted: every path that
//! loses a worker (time limit, panic, cancelled task) falls back to
//! [`BatchExecutor::abandon`].

use crate::constants::events;
use crate::events::EventPublisher;
use crate::models::BatchResult;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Everything a worker needs to execute one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchWorkUnit {
    pub job_id: i64,
    pub batch_id: i64,
    pub batch_number: i32,
    pub total_count: i64,
}

/// Executes batches. Implementations never fail: errors become failed results.
#[async_trait]
pub trait BatchExecutor: Send + Sync {
    async fn execute(&self, unit: BatchWorkUnit) -> BatchResult;

    /// Fail a batch whose execution was lost, sweeping its unfinished contacts
    async fn abandon(&self, unit: BatchWorkUnit, reason: &str) -> BatchResult;
}

/// A submitted unit of work
#[derive(Debug)]
pub struct DispatchHandle {
    pub unit: BatchWorkUnit,
    pub dispatch_id: Uuid,
    join: JoinHandle<BatchResult>,
}

impl DispatchHandle {
    pub fn new(unit: BatchWorkUnit, join: JoinHandle<BatchResult>) -> Self {
        Self {
            unit,
            dispatch_id: Uuid::new_v4(),
            join,
        }
    }
}

#[async_trait]
pub trait WorkDispatcher: Send + Sync {
    fn submit(&self, unit: BatchWorkUnit) -> DispatchHandle;

    /// Wait for every handle and return exactly one result per handle
    async fn barrier(&self, handles: Vec<DispatchHandle>) -> Vec<BatchResult>;
}

/// Runs batch workers as tokio tasks with bounded concurrency and a hard time
/// limit per batch
#[derive(Clone)]
pub struct TokioDispatcher {
    executor: Arc<dyn BatchExecutor>,
    semaphore: Arc<Semaphore>,
    time_limit: Duration,
    events: EventPublisher,
}

impl std::fmt::Debug for TokioDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioDispatcher")
            .field("available_permits", &self.semaphore.available_permits())
            .field("time_limit", &self.time_limit)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

impl TokioDispatcher {
    pub fn new(
        executor: Arc<dyn BatchExecutor>,
        max_concurrent_batches: usize,
        time_limit: Duration,
        events: EventPublisher,
    ) -> Self {
        Self {
            executor,
            semaphore: Arc::new(Semaphore::new(max_concurrent_batches.max(1))),
            time_limit,
            events,
        }
    }

    async fn run_unit(
        executor: Arc<dyn BatchExecutor>,
        semaphore: Arc<Semaphore>,
        time_limit: Duration,
        publisher: EventPublisher,
        unit: BatchWorkUnit,
    ) -> BatchResult {
        let _permit = match semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                error!(
                    job_id = unit.job_id,
                    batch_id = unit.batch_id,
                    "Semaphore closed - cannot execute batch, abandoning"
                );
                return executor
                    .abandon(unit, "dispatcher closed before the batch could start")
                    .await;
            }
        };

        debug!(
            job_id = unit.job_id,
            batch_id = unit.batch_id,
            batch_number = unit.batch_number,
            "Acquired permit, executing batch"
        );

        let execution = tokio::time::timeout(
            time_limit,
            AssertUnwindSafe(executor.execute(unit)).catch_unwind(),
        )
        .await;

        match execution {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                error!(
                    job_id = unit.job_id,
                    batch_id = unit.batch_id,
                    panic_msg = %message,
                    "Batch worker panicked"
                );
                executor
                    .abandon(unit, &format!("batch worker panicked: {message}"))
                    .await
            }
            Err(_) => {
                warn!(
                    job_id = unit.job_id,
                    batch_id = unit.batch_id,
                    time_limit_secs = time_limit.as_secs_f64(),
                    "Batch exceeded its time limit"
                );
                let _ = publisher
                    .publish(
                        events::BATCH_TIMED_OUT,
                        serde_json::json!({
                            "job_id": unit.job_id,
                            "batch_id": unit.batch_id,
                            "batch_number": unit.batch_number,
                            "time_limit_ms": time_limit.as_millis() as u64,
                        }),
                    )
                    .await;
                executor
                    .abandon(
                        unit,
                        &format!(
                            "batch time limit of {:.1}s exceeded",
                            time_limit.as_secs_f64()
                        ),
                    )
                    .await
            }
        }
    }
}

#[async_trait]
impl WorkDispatcher for TokioDispatcher {
    fn submit(&self, unit: BatchWorkUnit) -> DispatchHandle {
        let join = tokio::spawn(Self::run_unit(
            self.executor.clone(),
            self.semaphore.clone(),
            self.time_limit,
            self.events.clone(),
            unit,
        ));

        let handle = DispatchHandle::new(unit, join);
        debug!(
            job_id = unit.job_id,
            batch_id = unit.batch_id,
            dispatch_id = %handle.dispatch_id,
            "Submitted batch"
        );
        handle
    }

    async fn barrier(&self, handles: Vec<DispatchHandle>) -> Vec<BatchResult> {
        let expected = handles.len();
        let mut pending: FuturesUnordered<_> = handles
            .into_iter()
            .map(|handle| async move { (handle.unit, handle.join.await) })
            .collect();

        let mut results = Vec::with_capacity(expected);
        while let Some((unit, joined)) = pending.next().await {
            let result = match joined {
                Ok(result) => result,
                Err(join_error) => {
                    error!(
                        job_id = unit.job_id,
                        batch_id = unit.batch_id,
                        error = %join_error,
                        "Batch task did not complete"
                    );
                    self.executor
                        .abandon(unit, &format!("batch task did not complete: {join_error}"))
                        .await
                }
            };
            results.push(result);
        }

        debug!(batches = results.len(), "Barrier satisfied");
        results
    }
}

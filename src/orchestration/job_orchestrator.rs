//! # Job Orchestrator
//!
//! Turns a PENDING job and its staged input into dispatched batches:
//!
//! 1. parse the staged file and materialize batches with PENDING contacts
//! 2. move the job to IN_PROGRESS and stamp started_at
//! 3. submit every batch to the [`WorkDispatcher`]
//! 4. wait on the barrier and hand all results to the [`Aggregator`]
//!
//! Steps 1 and 2 are retried on transient errors with backoff. Any batches left
//! behind by a failed attempt are removed before the next one. The set of
//! dispatched batches is fixed once step 3 starts.

use super::aggregator::Aggregator;
use super::backoff::RetryPolicy;
use super::batch_splitter::BatchSplitter;
use super::dispatch::{BatchWorkUnit, WorkDispatcher};
use crate::constants::events;
use crate::database::JobStore;
use crate::error::{EnrichmentError, Result};
use crate::events::EventPublisher;
use crate::ingestion::parse_contacts;
use crate::logging::{log_error, log_job_operation};
use crate::models::{Batch, JobSummary};
use crate::staging::{InputStaging, StagedInput};
use crate::state_machine::{JobEvent, JobStateMachine};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// The spawned pipeline for one job; resolves once the job is terminal
#[derive(Debug)]
pub struct JobRunHandle {
    pub job_id: i64,
    join: JoinHandle<Result<JobSummary>>,
}

impl JobRunHandle {
    pub async fn wait(self) -> Result<JobSummary> {
        self.join.await.map_err(|e| {
            EnrichmentError::Internal(format!("pipeline task for job {} failed: {e}", self.job_id))
        })?
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

#[derive(Clone)]
pub struct JobOrchestrator {
    store: Arc<dyn JobStore>,
    staging: Arc<dyn InputStaging>,
    dispatcher: Arc<dyn WorkDispatcher>,
    aggregator: Aggregator,
    splitter: BatchSplitter,
    retry_policy: RetryPolicy,
    events: EventPublisher,
}

impl std::fmt::Debug for JobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator")
            .field("batch_size", &self.splitter.batch_size())
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        staging: Arc<dyn InputStaging>,
        dispatcher: Arc<dyn WorkDispatcher>,
        splitter: BatchSplitter,
        retry_policy: RetryPolicy,
        events: EventPublisher,
    ) -> Self {
        let aggregator = Aggregator::new(store.clone(), events.clone());
        Self {
            store,
            staging,
            dispatcher,
            aggregator,
            splitter,
            retry_policy,
            events,
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Launch the pipeline for a job in the background
    pub fn run(&self, job_id: i64, staged: StagedInput) -> JobRunHandle {
        let orchestrator = self.clone();
        let join = tokio::spawn(async move { orchestrator.execute(job_id, staged).await });
        JobRunHandle { job_id, join }
    }

    /// Run the whole pipeline for a job and wait for its terminal state
    #[instrument(skip(self, staged), fields(location = %staged.location.display()))]
    pub async fn execute(&self, job_id: i64, staged: StagedInput) -> Result<JobSummary> {
        let batches = match self.prepare_with_retry(job_id, &staged).await {
            Ok(batches) => batches,
            Err(e) => return Err(self.give_up(job_id, e).await),
        };

        let handles: Vec<_> = batches
            .iter()
            .map(|batch| {
                self.dispatcher.submit(BatchWorkUnit {
                    job_id,
                    batch_id: batch.batch_id,
                    batch_number: batch.batch_number,
                    total_count: batch.total_count,
                })
            })
            .collect();

        info!(job_id = job_id, batches = handles.len(), "Dispatched batches");

        let results = self.dispatcher.barrier(handles).await;
        self.aggregator.aggregate(job_id, &results).await
    }

    async fn prepare_with_retry(&self, job_id: i64, staged: &StagedInput) -> Result<Vec<Batch>> {
        let mut attempt = 1;
        loop {
            match self.prepare(job_id, staged).await {
                Ok(batches) => return Ok(batches),
                Err(e) if self.retry_policy.should_retry(&e, attempt) => {
                    let delay = self.retry_policy.delay_for(attempt);
                    warn!(
                        job_id = job_id,
                        attempt = attempt,
                        max_attempts = self.retry_policy.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Orchestration attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        return Err(EnrichmentError::OrchestrationError(format!(
                            "gave up after {attempt} attempts: {e}"
                        )));
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Everything up to and including the IN_PROGRESS transition
    async fn prepare(&self, job_id: i64, staged: &StagedInput) -> Result<Vec<Batch>> {
        let job = self
            .store
            .find_job(job_id)
            .await?
            .ok_or_else(|| EnrichmentError::job_not_found(job_id))?;

        // only a PENDING job may start
        JobStateMachine::determine_target_state(job.status, &JobEvent::Start)?;

        let bytes = self.staging.read(staged).await?;
        let records = parse_contacts(&bytes)?;

        let cleared = self.store.delete_batches_for_job(job_id).await?;
        if cleared > 0 {
            warn!(job_id = job_id, batches = cleared, "Removed batches from an earlier attempt");
        }

        let parsed = records.len() as i64;
        if parsed != job.total_count {
            warn!(
                job_id = job_id,
                recorded = job.total_count,
                parsed = parsed,
                "Staged row count differs from upload count, correcting"
            );
            self.store.update_job_total(job_id, parsed).await?;
        }

        let batches = self
            .splitter
            .materialize(self.store.as_ref(), job_id, &records)
            .await?;

        self.store.mark_job_started(job_id, Utc::now()).await?;

        let _ = self
            .events
            .publish(
                events::JOB_STARTED,
                json!({"job_id": job_id, "total_count": parsed, "batch_count": batches.len()}),
            )
            .await;
        log_job_operation(
            "start",
            Some(job_id),
            Some(&job.filename),
            "IN_PROGRESS",
            Some(&format!("contacts={parsed} batches={}", batches.len())),
        );
        debug!(job_id = job_id, batches = batches.len(), "Job prepared");

        Ok(batches)
    }

    /// Fail the job if it can still be failed, then hand the error back
    async fn give_up(&self, job_id: i64, error: EnrichmentError) -> EnrichmentError {
        log_error(
            "JobOrchestrator",
            "prepare",
            &error.to_string(),
            Some(&format!("job_id={job_id}")),
        );

        // unknown jobs and jobs owned by another run are left alone
        if error.is_not_found() || matches!(error, EnrichmentError::StateTransitionError(_)) {
            return error;
        }

        if let Err(cleanup_error) = self.store.delete_batches_for_job(job_id).await {
            warn!(job_id = job_id, error = %cleanup_error, "Could not remove undispatched batches");
        }

        if let Err(abort_error) = self.aggregator.abort_job(job_id, &error.to_string()).await {
            warn!(job_id = job_id, error = %abort_error, "Could not abort job");
        }
        error
    }
}

//! # Aggregator
//!
//! Fan-in step run once the barrier over every dispatched batch is satisfied.
//! Sums per-batch counts and moves the job to its terminal state. The job state
//! machine only accepts finalization from IN_PROGRESS and the store write is
//! compare-and-set, so a second aggregation for the same job is rejected and
//! leaves the job untouched.

use crate::constants::events;
use crate::database::{JobCompletion, JobStore};
use crate::error::{EnrichmentError, Result};
use crate::events::EventPublisher;
use crate::logging::log_job_operation;
use crate::models::{BatchResult, JobSummary};
use crate::state_machine::{JobEvent, JobStateMachine, ProcessingState};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Totals over a set of batch results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateCounts {
    pub processed: i64,
    pub success: i64,
    pub failed: i64,
    pub batch_count: usize,
}

impl AggregateCounts {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Sum batch results. Independent of order and free of side effects.
pub fn summarize(results: &[BatchResult]) -> AggregateCounts {
    results
        .iter()
        .fold(AggregateCounts::default(), |mut counts, result| {
            counts.processed += result.processed;
            counts.success += result.success;
            counts.failed += result.failed;
            counts.batch_count += 1;
            counts
        })
}

/// Make terminal counts add up to the job total. Contacts no result accounts
/// for count as failed.
fn settle_counts(job_id: i64, mut counts: AggregateCounts, total_count: i64) -> AggregateCounts {
    let settled = counts.success + counts.failed;
    if settled != total_count {
        warn!(
            job_id = job_id,
            total_count = total_count,
            settled = settled,
            "Batch results do not account for every contact, counting the rest as failed"
        );
        counts.success = counts.success.min(total_count);
        counts.failed = total_count - counts.success;
    }
    counts
}

#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn JobStore>,
    events: EventPublisher,
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator").finish_non_exhaustive()
    }
}

impl Aggregator {
    pub fn new(store: Arc<dyn JobStore>, events: EventPublisher) -> Self {
        Self { store, events }
    }

    /// Finalize a job from the results of all of its batches
    #[instrument(skip(self, results), fields(batches = results.len()))]
    pub async fn aggregate(&self, job_id: i64, results: &[BatchResult]) -> Result<JobSummary> {
        let job = self
            .store
            .find_job(job_id)
            .await?
            .ok_or_else(|| EnrichmentError::job_not_found(job_id))?;

        let counts = settle_counts(job_id, summarize(results), job.total_count);
        let event = if counts.is_clean() {
            JobEvent::Complete
        } else {
            JobEvent::Fail(format!("{} of {} contacts failed", counts.failed, job.total_count))
        };
        let status = JobStateMachine::determine_target_state(job.status, &event)?;

        let finalized = self
            .store
            .finalize_job(
                job_id,
                job.status,
                JobCompletion {
                    status,
                    success_count: counts.success,
                    failure_count: counts.failed,
                    completed_at: Utc::now(),
                },
            )
            .await?;

        self.announce(&finalized.status, job_id, counts.success, counts.failed, None)
            .await;

        info!(
            job_id = job_id,
            status = %finalized.status,
            success = counts.success,
            failed = counts.failed,
            batch_count = counts.batch_count,
            "Job aggregated"
        );

        Ok(JobSummary {
            job_id,
            status: finalized.status,
            total_contacts: finalized.total_count,
            success: counts.success,
            failed: counts.failed,
            batch_count: counts.batch_count,
        })
    }

    /// Fail a job whose orchestration gave up; every contact counts as failed
    #[instrument(skip(self))]
    pub async fn abort_job(&self, job_id: i64, reason: &str) -> Result<JobSummary> {
        let job = self
            .store
            .find_job(job_id)
            .await?
            .ok_or_else(|| EnrichmentError::job_not_found(job_id))?;

        let status =
            JobStateMachine::determine_target_state(job.status, &JobEvent::Fail(reason.to_string()))?;

        let finalized = self
            .store
            .finalize_job(
                job_id,
                job.status,
                JobCompletion {
                    status,
                    success_count: 0,
                    failure_count: job.total_count,
                    completed_at: Utc::now(),
                },
            )
            .await?;

        self.announce(&finalized.status, job_id, 0, job.total_count, Some(reason))
            .await;

        Ok(JobSummary {
            job_id,
            status: finalized.status,
            total_contacts: finalized.total_count,
            success: 0,
            failed: finalized.failure_count,
            batch_count: 0,
        })
    }

    async fn announce(
        &self,
        status: &ProcessingState,
        job_id: i64,
        success: i64,
        failed: i64,
        reason: Option<&str>,
    ) {
        let event_name = if *status == ProcessingState::Success {
            events::JOB_COMPLETED
        } else {
            events::JOB_FAILED
        };

        let _ = self
            .events
            .publish(
                event_name,
                json!({"job_id": job_id, "success": success, "failed": failed, "reason": reason}),
            )
            .await;

        log_job_operation("finalize", Some(job_id), None, status.as_str(), reason);
    }
}

//! # Intake Service
//!
//! The upload boundary and the two read-only queries, free of any transport.
//! An HTTP layer or the CLI sits on top of this.
//!
//! Accepting an upload creates the PENDING job, stages the raw bytes and
//! launches the pipeline in the background. Status and results only read the
//! job row.

use crate::config::EnrichmentConfig;
use crate::constants::system;
use crate::database::JobStore;
use crate::enrichment::EnrichmentClient;
use crate::error::{EnrichmentError, Result};
use crate::events::EventPublisher;
use crate::ingestion::count_data_rows;
use crate::logging::log_job_operation;
use crate::models::{JobSummary, NewJob};
use crate::orchestration::{
    BatchSplitter, BatchWorker, JobOrchestrator, JobRunHandle, RetryPolicy, TokioDispatcher,
};
use crate::staging::{FilesystemStaging, InputStaging};
use crate::state_machine::ProcessingState;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Returned once an upload has been accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub job_id: i64,
    pub filename: String,
    pub total_count: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub job_id: i64,
    pub status: ProcessingState,
    pub completion_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "summary", rename_all = "snake_case")]
pub enum ResultsAvailability {
    /// The job has not reached a terminal state yet
    Pending,
    Ready(JobSummary),
}

impl ResultsAvailability {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

#[derive(Clone)]
pub struct IntakeService {
    store: Arc<dyn JobStore>,
    staging: Arc<dyn InputStaging>,
    orchestrator: JobOrchestrator,
}

impl std::fmt::Debug for IntakeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntakeService")
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

impl IntakeService {
    pub fn new(
        store: Arc<dyn JobStore>,
        staging: Arc<dyn InputStaging>,
        orchestrator: JobOrchestrator,
    ) -> Self {
        Self {
            store,
            staging,
            orchestrator,
        }
    }

    /// Wire staging, workers, dispatcher and orchestrator from configuration
    pub fn from_config(
        config: &EnrichmentConfig,
        store: Arc<dyn JobStore>,
        client: Arc<dyn EnrichmentClient>,
        events: EventPublisher,
    ) -> Result<Self> {
        config.validate()?;

        let staging: Arc<dyn InputStaging> =
            Arc::new(FilesystemStaging::new(&config.staging.upload_root));
        let worker = Arc::new(BatchWorker::new(store.clone(), client, events.clone()));
        let dispatcher = Arc::new(TokioDispatcher::new(
            worker,
            config.execution.max_concurrent_batches,
            config.execution.batch_time_limit(),
            events.clone(),
        ));
        let orchestrator = JobOrchestrator::new(
            store.clone(),
            staging.clone(),
            dispatcher,
            BatchSplitter::new(config.batching.batch_size)?,
            RetryPolicy::from_config(&config.backoff),
            events,
        );

        Ok(Self::new(store, staging, orchestrator))
    }

    pub fn orchestrator(&self) -> &JobOrchestrator {
        &self.orchestrator
    }

    /// Accept an uploaded CSV and start processing it
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn accept_upload(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<(UploadReceipt, JobRunHandle)> {
        validate_filename(filename)?;
        std::str::from_utf8(bytes).map_err(|e| {
            EnrichmentError::ValidationError(format!("{filename} is not valid UTF-8: {e}"))
        })?;

        let total_count = count_data_rows(bytes)? as i64;

        let job = self
            .store
            .create_job(NewJob {
                filename: filename.to_string(),
                total_count,
            })
            .await?;

        let staged = match self.staging.stage(job.job_id, bytes).await {
            Ok(staged) => staged,
            Err(e) => {
                // a job without staged input can never run
                if let Err(abort_error) = self
                    .orchestrator
                    .aggregator()
                    .abort_job(job.job_id, &e.to_string())
                    .await
                {
                    warn!(job_id = job.job_id, error = %abort_error, "Could not abort unstaged job");
                }
                return Err(e);
            }
        };

        log_job_operation(
            "upload",
            Some(job.job_id),
            Some(filename),
            job.status.as_str(),
            Some(&format!("total_count={total_count}")),
        );

        let handle = self.orchestrator.run(job.job_id, staged);
        info!(job_id = job.job_id, total_count = total_count, "Upload accepted");

        Ok((
            UploadReceipt {
                job_id: job.job_id,
                filename: job.filename,
                total_count,
                message: system::UPLOAD_ACCEPTED_MESSAGE.to_string(),
            },
            handle,
        ))
    }

    pub async fn job_status(&self, job_id: i64) -> Result<JobStatusReport> {
        let job = self
            .store
            .find_job(job_id)
            .await?
            .ok_or_else(|| EnrichmentError::job_not_found(job_id))?;

        Ok(JobStatusReport {
            job_id,
            status: job.status,
            completion_percentage: job.completion_percentage(),
        })
    }

    pub async fn job_results(&self, job_id: i64) -> Result<ResultsAvailability> {
        let job = self
            .store
            .find_job(job_id)
            .await?
            .ok_or_else(|| EnrichmentError::job_not_found(job_id))?;

        if !job.is_terminal() {
            return Ok(ResultsAvailability::Pending);
        }

        let batch_count = self.store.list_batches(job_id).await?.len();
        Ok(ResultsAvailability::Ready(JobSummary {
            job_id,
            status: job.status,
            total_contacts: job.total_count,
            success: job.success_count,
            failed: job.failure_count,
            batch_count,
        }))
    }
}

fn validate_filename(filename: &str) -> Result<()> {
    let is_csv = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(system::UPLOAD_EXTENSION));

    if !is_csv {
        return Err(EnrichmentError::ValidationError(format!(
            "Only CSV files are allowed, got '{filename}'"
        )));
    }
    Ok(())
}

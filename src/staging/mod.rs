//! # Input Staging
//!
//! Uploaded bytes are staged under a well-known, job-keyed location before the
//! pipeline is enqueued; the orchestrator reads them back from there.

use crate::constants::system;
use crate::error::{EnrichmentError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Reference to staged input, handed from intake to the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedInput {
    pub job_id: i64,
    pub location: PathBuf,
}

#[async_trait]
pub trait InputStaging: Send + Sync {
    async fn stage(&self, job_id: i64, bytes: &[u8]) -> Result<StagedInput>;

    async fn read(&self, staged: &StagedInput) -> Result<Vec<u8>>;
}

/// Stages files as `job_{id}_contacts.csv` under an upload root
#[derive(Debug, Clone)]
pub struct FilesystemStaging {
    upload_root: PathBuf,
}

impl FilesystemStaging {
    pub fn new(upload_root: impl Into<PathBuf>) -> Self {
        Self {
            upload_root: upload_root.into(),
        }
    }

    pub fn upload_root(&self) -> &std::path::Path {
        &self.upload_root
    }
}

#[async_trait]
impl InputStaging for FilesystemStaging {
    async fn stage(&self, job_id: i64, bytes: &[u8]) -> Result<StagedInput> {
        tokio::fs::create_dir_all(&self.upload_root).await.map_err(|e| {
            EnrichmentError::StagingError(format!(
                "Failed to create upload root {}: {e}",
                self.upload_root.display()
            ))
        })?;

        let location = self.upload_root.join(system::staged_file_name(job_id));
        tokio::fs::write(&location, bytes).await.map_err(|e| {
            EnrichmentError::StagingError(format!(
                "Failed to stage input for job {job_id} at {}: {e}",
                location.display()
            ))
        })?;

        debug!(job_id = job_id, location = %location.display(), bytes = bytes.len(), "Staged input");
        Ok(StagedInput { job_id, location })
    }

    async fn read(&self, staged: &StagedInput) -> Result<Vec<u8>> {
        tokio::fs::read(&staged.location).await.map_err(|e| {
            EnrichmentError::StagingError(format!(
                "Failed to read staged input for job {} at {}: {e}",
                staged.job_id,
                staged.location.display()
            ))
        })
    }
}

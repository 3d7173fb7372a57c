//! # System Constants
//!
//! Event names, status groupings and operational defaults shared across the
//! pipeline.

use crate::state_machine::ProcessingState;

/// Lifecycle events published on the event channel
pub mod events {
    // Job lifecycle events
    pub const JOB_STARTED: &str = "job.started";
    pub const JOB_COMPLETED: &str = "job.completed";
    pub const JOB_FAILED: &str = "job.failed";

    // Batch lifecycle events
    pub const BATCH_STARTED: &str = "batch.started";
    pub const BATCH_COMPLETED: &str = "batch.completed";
    pub const BATCH_FAILED: &str = "batch.failed";
    pub const BATCH_TIMED_OUT: &str = "batch.timed_out";

    // Contact events
    pub const CONTACT_FAILED: &str = "contact.failed";
    pub const CONTACTS_RECLAIMED: &str = "contacts.reclaimed";
}

/// System-wide constants
pub mod system {
    /// Contacts per batch when nothing else is configured
    pub const DEFAULT_BATCH_SIZE: usize = 2;

    /// Staged input file name for a job
    pub fn staged_file_name(job_id: i64) -> String {
        format!("job_{job_id}_contacts.csv")
    }

    /// Accepted upload extension, compared case-insensitively
    pub const UPLOAD_EXTENSION: &str = "csv";

    /// Error recorded on contacts reclaimed from a dead worker
    pub const ORPHANED_CONTACT_ERROR: &str = "orphaned: lease expired";

    pub const UPLOAD_ACCEPTED_MESSAGE: &str = "File uploaded successfully. Processing started.";
}

/// Status groupings for validation and logic
pub mod status_groups {
    use super::ProcessingState;

    /// States a job, batch or contact never leaves
    pub const FINAL_STATES: &[ProcessingState] = &[ProcessingState::Success, ProcessingState::Failed];

    /// States that still represent outstanding work
    pub const ACTIVE_STATES: &[ProcessingState] =
        &[ProcessingState::Pending, ProcessingState::InProgress];
}

use crate::state_machine::ProcessingState;
use serde::{Deserialize, Serialize};

/// Outcome of one batch execution, the only thing a batch worker hands to the
/// aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: i64,
    /// Contacts picked up by this execution
    pub processed: i64,
    pub success: i64,
    pub failed: i64,
    /// Contacts that ended FAILED, in processing order
    pub error_contact_ids: Vec<i64>,
}

impl BatchResult {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Final counts for a job, produced by the aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: i64,
    pub status: ProcessingState,
    pub total_contacts: i64,
    pub success: i64,
    pub failed: i64,
    pub batch_count: usize,
}

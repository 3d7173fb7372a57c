use crate::state_machine::ProcessingState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A contiguous slice of a job's contacts, processed as one parallel unit.
///
/// `batch_number` is the 0-based position of the slice in the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: i64,
    pub job_id: i64,
    pub batch_number: i32,
    pub status: ProcessingState,
    pub total_count: i64,
    pub processed_count: i64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBatch {
    pub job_id: i64,
    pub batch_number: i32,
    pub total_count: i64,
}

impl Batch {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

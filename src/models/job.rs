//! # Job Model
//!
//! One job per uploaded file. Created PENDING at upload time, moved to
//! IN_PROGRESS by the orchestrator and to a terminal state by the aggregator.

use crate::state_machine::ProcessingState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: i64,
    pub filename: String,
    pub status: ProcessingState,
    /// Contacts expected, header row excluded
    pub total_count: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// New Job for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub filename: String,
    pub total_count: i64,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Contacts that reached a terminal state, as counted by the aggregator
    pub fn settled_count(&self) -> i64 {
        self.success_count + self.failure_count
    }

    /// Share of contacts settled, in percent.
    ///
    /// An empty job reports 100 once terminal and 0 before.
    pub fn completion_percentage(&self) -> f64 {
        if self.total_count <= 0 {
            return if self.is_terminal() { 100.0 } else { 0.0 };
        }
        (self.settled_count() as f64 / self.total_count as f64) * 100.0
    }
}

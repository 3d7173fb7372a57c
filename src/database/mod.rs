//! # Persistence
//!
//! The [`JobStore`] trait is the only way the pipeline touches storage. Two
//! implementations ship with the crate:
//!
//! - [`memory::InMemoryJobStore`] for tests and single-process runs
//! - [`postgres::PgJobStore`] backed by PostgreSQL through SQLx
//!
//! Status writes are compare-and-set: callers pass the status they expect the
//! record to be in, and the store refuses the write if another owner got there
//! first. Combined with the transition tables in [`crate::state_machine`] this
//! keeps every status monotonic without explicit locking.

pub mod memory;
pub mod postgres;

use crate::error::Result;
use crate::models::{Batch, Contact, Job, NewBatch, NewContact, NewJob};
use crate::state_machine::ProcessingState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::InMemoryJobStore;
pub use postgres::PgJobStore;

/// Terminal values written to a job by the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobCompletion {
    pub status: ProcessingState,
    pub success_count: i64,
    pub failure_count: i64,
    pub completed_at: DateTime<Utc>,
}

/// Terminal values written to a batch by its worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchCompletion {
    pub status: ProcessingState,
    pub processed_count: i64,
    pub completed_at: DateTime<Utc>,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, new_job: NewJob) -> Result<Job>;

    async fn find_job(&self, job_id: i64) -> Result<Option<Job>>;

    /// Overwrite the expected contact count of a job that has not started
    async fn update_job_total(&self, job_id: i64, total_count: i64) -> Result<Job>;

    /// PENDING -> IN_PROGRESS, stamping started_at
    async fn mark_job_started(&self, job_id: i64, started_at: DateTime<Utc>) -> Result<Job>;

    /// Write a terminal status if the job is still in `expected`
    async fn finalize_job(
        &self,
        job_id: i64,
        expected: ProcessingState,
        completion: JobCompletion,
    ) -> Result<Job>;

    /// Create a batch and all of its PENDING contacts atomically
    async fn create_batch_with_contacts(
        &self,
        new_batch: NewBatch,
        contacts: Vec<NewContact>,
    ) -> Result<Batch>;

    /// Remove every batch of a job together with its contacts
    async fn delete_batches_for_job(&self, job_id: i64) -> Result<u64>;

    /// Batches of a job ordered by batch_number
    async fn list_batches(&self, job_id: i64) -> Result<Vec<Batch>>;

    async fn find_batch(&self, batch_id: i64) -> Result<Option<Batch>>;

    /// PENDING -> IN_PROGRESS, stamping started_at
    async fn mark_batch_started(&self, batch_id: i64, started_at: DateTime<Utc>) -> Result<Batch>;

    /// Write a terminal status if the batch is still in `expected`
    async fn finalize_batch(
        &self,
        batch_id: i64,
        expected: ProcessingState,
        completion: BatchCompletion,
    ) -> Result<Batch>;

    /// PENDING contacts of a batch in insertion order
    async fn pending_contacts(&self, batch_id: i64) -> Result<Vec<Contact>>;

    /// Persist a contact if its stored status still equals `expected`.
    ///
    /// Returns `false` when another owner (the staleness sweep) changed it first.
    async fn save_contact(&self, contact: &Contact, expected: ProcessingState) -> Result<bool>;

    async fn count_contacts(&self, batch_id: i64) -> Result<i64>;

    /// All contacts of a batch in insertion order
    async fn list_contacts(&self, batch_id: i64) -> Result<Vec<Contact>>;

    /// All contacts of a job in insertion order
    async fn list_job_contacts(&self, job_id: i64) -> Result<Vec<Contact>>;

    /// IN_PROGRESS contacts claimed before `claimed_before`
    async fn stale_contacts(&self, claimed_before: DateTime<Utc>) -> Result<Vec<Contact>>;

    /// IN_PROGRESS batches started before `started_before`
    async fn stale_batches(&self, started_before: DateTime<Utc>) -> Result<Vec<Batch>>;

    /// Delete a job and, by cascade, its batches and contacts
    async fn delete_job(&self, job_id: i64) -> Result<()>;
}

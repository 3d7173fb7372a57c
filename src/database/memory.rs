//! In-process [`JobStore`] built on `DashMap`.
//!
//! Each record lives behind its own shard lock, so the compare-and-set writes
//! are atomic per record. Contacts of a batch are indexed in insertion order.

use super::{BatchCompletion, JobCompletion, JobStore};
use crate::error::{EnrichmentError, Result};
use crate::models::{Batch, Contact, Job, NewBatch, NewContact, NewJob};
use crate::state_machine::ProcessingState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<i64, Job>,
    batches: DashMap<i64, Batch>,
    contacts: DashMap<i64, Contact>,
    /// batch_id -> contact ids in insertion order
    batch_contacts: RwLock<HashMap<i64, Vec<i64>>>,
    job_sequence: AtomicI64,
    batch_sequence: AtomicI64,
    contact_sequence: AtomicI64,
}

fn status_mismatch(
    entity: &str,
    id: i64,
    actual: ProcessingState,
    expected: ProcessingState,
) -> EnrichmentError {
    EnrichmentError::StateTransitionError(format!(
        "{entity} {id} is {actual}, expected {expected}"
    ))
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(sequence: &AtomicI64) -> i64 {
        sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn contacts_of(&self, batch_id: i64) -> Vec<Contact> {
        let index = self.batch_contacts.read();
        index
            .get(&batch_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.contacts.get(id).map(|c| c.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn remove_batch(&self, batch_id: i64) {
        self.batches.remove(&batch_id);
        if let Some(ids) = self.batch_contacts.write().remove(&batch_id) {
            for id in ids {
                self.contacts.remove(&id);
            }
        }
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create_job(&self, new_job: NewJob) -> Result<Job> {
        let job = Job {
            job_id: Self::next_id(&self.job_sequence),
            filename: new_job.filename,
            status: ProcessingState::Pending,
            total_count: new_job.total_count,
            success_count: 0,
            failure_count: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.jobs.insert(job.job_id, job.clone());
        Ok(job)
    }

    async fn find_job(&self, job_id: i64) -> Result<Option<Job>> {
        Ok(self.jobs.get(&job_id).map(|job| job.clone()))
    }

    async fn update_job_total(&self, job_id: i64, total_count: i64) -> Result<Job> {
        let mut job = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| EnrichmentError::job_not_found(job_id))?;
        if job.status != ProcessingState::Pending {
            return Err(status_mismatch(
                "job",
                job_id,
                job.status,
                ProcessingState::Pending,
            ));
        }
        job.total_count = total_count;
        Ok(job.clone())
    }

    async fn mark_job_started(&self, job_id: i64, started_at: DateTime<Utc>) -> Result<Job> {
        let mut job = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| EnrichmentError::job_not_found(job_id))?;
        if job.status != ProcessingState::Pending {
            return Err(status_mismatch(
                "job",
                job_id,
                job.status,
                ProcessingState::Pending,
            ));
        }
        job.status = ProcessingState::InProgress;
        job.started_at = Some(started_at);
        Ok(job.clone())
    }

    async fn finalize_job(
        &self,
        job_id: i64,
        expected: ProcessingState,
        completion: JobCompletion,
    ) -> Result<Job> {
        let mut job = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| EnrichmentError::job_not_found(job_id))?;
        if job.status != expected {
            return Err(status_mismatch("job", job_id, job.status, expected));
        }
        job.status = completion.status;
        job.success_count = completion.success_count;
        job.failure_count = completion.failure_count;
        job.completed_at = Some(completion.completed_at);
        Ok(job.clone())
    }

    async fn create_batch_with_contacts(
        &self,
        new_batch: NewBatch,
        contacts: Vec<NewContact>,
    ) -> Result<Batch> {
        if !self.jobs.contains_key(&new_batch.job_id) {
            return Err(EnrichmentError::job_not_found(new_batch.job_id));
        }

        let duplicate = self.batches.iter().any(|b| {
            b.job_id == new_batch.job_id && b.batch_number == new_batch.batch_number
        });
        if duplicate {
            return Err(EnrichmentError::DatabaseError(format!(
                "batch {} already exists for job {}",
                new_batch.batch_number, new_batch.job_id
            )));
        }

        let batch = Batch {
            batch_id: Self::next_id(&self.batch_sequence),
            job_id: new_batch.job_id,
            batch_number: new_batch.batch_number,
            status: ProcessingState::Pending,
            total_count: new_batch.total_count,
            processed_count: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };

        let mut ids = Vec::with_capacity(contacts.len());
        for new_contact in contacts {
            let contact = Contact::pending(
                Self::next_id(&self.contact_sequence),
                batch.batch_id,
                new_contact,
            );
            ids.push(contact.contact_id);
            self.contacts.insert(contact.contact_id, contact);
        }

        self.batch_contacts.write().insert(batch.batch_id, ids);
        self.batches.insert(batch.batch_id, batch.clone());
        Ok(batch)
    }

    async fn delete_batches_for_job(&self, job_id: i64) -> Result<u64> {
        let batch_ids: Vec<i64> = self
            .batches
            .iter()
            .filter(|b| b.job_id == job_id)
            .map(|b| b.batch_id)
            .collect();

        for batch_id in &batch_ids {
            self.remove_batch(*batch_id);
        }
        Ok(batch_ids.len() as u64)
    }

    async fn list_batches(&self, job_id: i64) -> Result<Vec<Batch>> {
        let mut batches: Vec<Batch> = self
            .batches
            .iter()
            .filter(|b| b.job_id == job_id)
            .map(|b| b.clone())
            .collect();
        batches.sort_by_key(|b| b.batch_number);
        Ok(batches)
    }

    async fn find_batch(&self, batch_id: i64) -> Result<Option<Batch>> {
        Ok(self.batches.get(&batch_id).map(|b| b.clone()))
    }

    async fn mark_batch_started(&self, batch_id: i64, started_at: DateTime<Utc>) -> Result<Batch> {
        let mut batch = self
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| EnrichmentError::batch_not_found(batch_id))?;
        if batch.status != ProcessingState::Pending {
            return Err(status_mismatch(
                "batch",
                batch_id,
                batch.status,
                ProcessingState::Pending,
            ));
        }
        batch.status = ProcessingState::InProgress;
        batch.started_at = Some(started_at);
        Ok(batch.clone())
    }

    async fn finalize_batch(
        &self,
        batch_id: i64,
        expected: ProcessingState,
        completion: BatchCompletion,
    ) -> Result<Batch> {
        let mut batch = self
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| EnrichmentError::batch_not_found(batch_id))?;
        if batch.status != expected {
            return Err(status_mismatch("batch", batch_id, batch.status, expected));
        }
        batch.status = completion.status;
        batch.processed_count = completion.processed_count;
        batch.completed_at = Some(completion.completed_at);
        Ok(batch.clone())
    }

    async fn pending_contacts(&self, batch_id: i64) -> Result<Vec<Contact>> {
        Ok(self
            .contacts_of(batch_id)
            .into_iter()
            .filter(|c| c.status == ProcessingState::Pending)
            .collect())
    }

    async fn save_contact(&self, contact: &Contact, expected: ProcessingState) -> Result<bool> {
        let mut stored = self
            .contacts
            .get_mut(&contact.contact_id)
            .ok_or_else(|| EnrichmentError::contact_not_found(contact.contact_id))?;
        if stored.status != expected {
            return Ok(false);
        }
        *stored = contact.clone();
        Ok(true)
    }

    async fn count_contacts(&self, batch_id: i64) -> Result<i64> {
        Ok(self
            .batch_contacts
            .read()
            .get(&batch_id)
            .map_or(0, |ids| ids.len() as i64))
    }

    async fn list_contacts(&self, batch_id: i64) -> Result<Vec<Contact>> {
        Ok(self.contacts_of(batch_id))
    }

    async fn list_job_contacts(&self, job_id: i64) -> Result<Vec<Contact>> {
        let mut contacts: Vec<Contact> = self
            .contacts
            .iter()
            .filter(|c| c.job_id == job_id)
            .map(|c| c.clone())
            .collect();
        contacts.sort_by_key(|c| c.contact_id);
        Ok(contacts)
    }

    async fn stale_contacts(&self, claimed_before: DateTime<Utc>) -> Result<Vec<Contact>> {
        let mut contacts: Vec<Contact> = self
            .contacts
            .iter()
            .filter(|c| {
                c.status == ProcessingState::InProgress
                    && c.claimed_at.is_some_and(|claimed| claimed < claimed_before)
            })
            .map(|c| c.clone())
            .collect();
        contacts.sort_by_key(|c| c.contact_id);
        Ok(contacts)
    }

    async fn stale_batches(&self, started_before: DateTime<Utc>) -> Result<Vec<Batch>> {
        let mut batches: Vec<Batch> = self
            .batches
            .iter()
            .filter(|b| {
                b.status == ProcessingState::InProgress
                    && b.started_at.is_some_and(|started| started < started_before)
            })
            .map(|b| b.clone())
            .collect();
        batches.sort_by_key(|b| b.batch_id);
        Ok(batches)
    }

    async fn delete_job(&self, job_id: i64) -> Result<()> {
        if self.jobs.remove(&job_id).is_none() {
            return Err(EnrichmentError::job_not_found(job_id));
        }
        self.delete_batches_for_job(job_id).await?;
        Ok(())
    }
}

//! # Batch Splitter
//!
//! Partitions parsed contact records into contiguous, fixed-size slices in
//! input order, then persists one batch (with its PENDING contacts) per slice.

use crate::database::JobStore;
use crate::error::{EnrichmentError, Result};
use crate::models::{Batch, ContactRecord, NewBatch, NewContact};
use tracing::debug;

/// One planned batch: a borrowed slice of the input and its 0-based position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSlice<'a, T> {
    pub batch_number: i32,
    pub records: &'a [T],
}

#[derive(Debug, Clone, Copy)]
pub struct BatchSplitter {
    batch_size: usize,
}

impl BatchSplitter {
    pub fn new(batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(EnrichmentError::ValidationError(
                "batch size must be greater than 0".to_string(),
            ));
        }
        Ok(Self { batch_size })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Split `records` without touching storage. The last slice may be short.
    pub fn plan<'a, T>(&self, records: &'a [T]) -> Result<Vec<BatchSlice<'a, T>>> {
        records
            .chunks(self.batch_size)
            .enumerate()
            .map(|(index, chunk)| {
                let batch_number = i32::try_from(index).map_err(|_| {
                    EnrichmentError::ValidationError(format!(
                        "input produces more than {} batches",
                        i32::MAX
                    ))
                })?;
                Ok(BatchSlice {
                    batch_number,
                    records: chunk,
                })
            })
            .collect()
    }

    /// Persist every planned batch with its contacts, in batch_number order
    pub async fn materialize(
        &self,
        store: &dyn JobStore,
        job_id: i64,
        records: &[ContactRecord],
    ) -> Result<Vec<Batch>> {
        let plan = self.plan(records)?;
        let mut batches = Vec::with_capacity(plan.len());

        for slice in plan {
            let contacts: Vec<NewContact> = slice
                .records
                .iter()
                .map(|record| NewContact::from_record(job_id, record))
                .collect();

            let batch = store
                .create_batch_with_contacts(
                    NewBatch {
                        job_id,
                        batch_number: slice.batch_number,
                        total_count: slice.records.len() as i64,
                    },
                    contacts,
                )
                .await?;

            debug!(
                job_id = job_id,
                batch_id = batch.batch_id,
                batch_number = batch.batch_number,
                total_count = batch.total_count,
                "Materialized batch"
            );
            batches.push(batch);
        }

        Ok(batches)
    }
}

//! # Batch Worker
//!
//! Processes the PENDING contacts of one batch, strictly one after another.
//! Each contact is claimed (IN_PROGRESS, persisted) before any lookup so that a
//! crash leaves an auditable in-flight marker. A failing contact is recorded and
//! skipped; it never stops its siblings.
//!
//! The batch ends SUCCESS only if none of its contacts failed.

use super::dispatch::{BatchExecutor, BatchWorkUnit};
use crate::constants::events;
use crate::database::{BatchCompletion, JobStore};
use crate::enrichment::{EmailLookup, EnrichmentClient, LookupOutcome};
use crate::error::{EnrichmentError, Result};
use crate::events::EventPublisher;
use crate::logging::{log_batch_operation, log_contact_operation, log_error};
use crate::models::{BatchResult, Contact, EmailCheck};
use crate::state_machine::{
    BatchEvent, BatchStateMachine, ContactEvent, ContactStateMachine, ProcessingState,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// How one contact ended up after this execution
#[derive(Debug, Clone, PartialEq, Eq)]
enum ContactOutcome {
    Succeeded,
    Failed(String),
    /// Claimed by someone else before this worker got to it
    Skipped,
}

#[derive(Clone)]
pub struct BatchWorker {
    store: Arc<dyn JobStore>,
    client: Arc<dyn EnrichmentClient>,
    events: EventPublisher,
}

impl std::fmt::Debug for BatchWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchWorker").finish_non_exhaustive()
    }
}

impl BatchWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        client: Arc<dyn EnrichmentClient>,
        events: EventPublisher,
    ) -> Self {
        Self {
            store,
            client,
            events,
        }
    }

    /// Run the batch, propagating only storage-level failures
    #[instrument(skip(self), fields(job_id = unit.job_id, batch_id = unit.batch_id, batch_number = unit.batch_number))]
    pub async fn process(&self, unit: BatchWorkUnit) -> Result<BatchResult> {
        let batch = self
            .store
            .find_batch(unit.batch_id)
            .await?
            .ok_or_else(|| EnrichmentError::batch_not_found(unit.batch_id))?;

        if batch.is_terminal() {
            warn!(status = %batch.status, "Batch already finished, reporting stored outcome");
            return self.stored_result(unit).await;
        }

        if batch.status == ProcessingState::Pending {
            BatchStateMachine::determine_target_state(batch.status, &BatchEvent::Start)?;
            self.store.mark_batch_started(unit.batch_id, Utc::now()).await?;
            let _ = self
                .events
                .publish(
                    events::BATCH_STARTED,
                    json!({"job_id": unit.job_id, "batch_id": unit.batch_id, "batch_number": unit.batch_number}),
                )
                .await;
        }

        let contacts = self.store.pending_contacts(unit.batch_id).await?;
        let mut result = BatchResult {
            batch_id: unit.batch_id,
            processed: contacts.len() as i64,
            success: 0,
            failed: 0,
            error_contact_ids: Vec::new(),
        };

        for contact in contacts {
            let contact_id = contact.contact_id;
            match self.process_contact(contact).await {
                ContactOutcome::Succeeded => result.success += 1,
                ContactOutcome::Failed(message) => {
                    result.failed += 1;
                    result.error_contact_ids.push(contact_id);
                    let _ = self
                        .events
                        .publish(
                            events::CONTACT_FAILED,
                            json!({"job_id": unit.job_id, "batch_id": unit.batch_id, "contact_id": contact_id, "error": message}),
                        )
                        .await;
                }
                ContactOutcome::Skipped => result.processed -= 1,
            }
        }

        self.finish_batch(unit, &result).await?;
        Ok(result)
    }

    /// Errors for one contact fail that contact only
    async fn process_contact(&self, contact: Contact) -> ContactOutcome {
        let contact_id = contact.contact_id;
        match self.try_process_contact(contact.clone()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = e.to_string();
                warn!(contact_id = contact_id, error = %message, "Contact processing failed");
                self.record_failure(contact, &message).await;
                ContactOutcome::Failed(message)
            }
        }
    }

    /// Best-effort FAILED write for a contact whose own processing errored.
    /// The claim may or may not have been persisted, so both prior states are tried.
    async fn record_failure(&self, mut contact: Contact, message: &str) {
        let contact_id = contact.contact_id;
        contact.status = ProcessingState::Failed;
        contact.error_message = Some(message.to_string());
        contact.processed_at = Some(Utc::now());

        for expected in [ProcessingState::InProgress, ProcessingState::Pending] {
            match self.store.save_contact(&contact, expected).await {
                Ok(true) => {
                    log_contact_operation(
                        "process",
                        Some(contact.batch_id),
                        Some(contact_id),
                        contact.status.as_str(),
                        Some(message),
                    );
                    return;
                }
                Ok(false) => continue,
                Err(e) => {
                    warn!(contact_id = contact_id, error = %e, "Could not record contact failure");
                    return;
                }
            }
        }
        debug!(contact_id = contact_id, "Contact already settled elsewhere");
    }

    async fn try_process_contact(&self, mut contact: Contact) -> Result<ContactOutcome> {
        let contact_id = contact.contact_id;

        contact.status =
            ContactStateMachine::determine_target_state(contact.status, &ContactEvent::Start)?;
        contact.claimed_at = Some(Utc::now());
        if !self
            .store
            .save_contact(&contact, ProcessingState::Pending)
            .await?
        {
            debug!(contact_id = contact_id, "Contact claimed elsewhere, skipping");
            return Ok(ContactOutcome::Skipped);
        }

        let (event, outcome) = match self.enrich(&mut contact).await {
            Ok(()) => (ContactEvent::Succeed, ContactOutcome::Succeeded),
            Err(e) => {
                let message = e.to_string();
                warn!(contact_id = contact_id, error = %message, "Contact enrichment failed");
                (ContactEvent::Fail(message.clone()), ContactOutcome::Failed(message))
            }
        };

        contact.status = ContactStateMachine::determine_target_state(contact.status, &event)?;
        contact.error_message = event.error_message().map(str::to_string);
        if contact.status == ProcessingState::Success {
            contact.processed_at = Some(Utc::now());
        }

        if !self
            .store
            .save_contact(&contact, ProcessingState::InProgress)
            .await?
        {
            // the staleness sweep failed it while the lookups were running
            warn!(contact_id = contact_id, "Contact was reclaimed before it could be saved");
            return Ok(ContactOutcome::Failed(
                "contact reclaimed before completion".to_string(),
            ));
        }

        log_contact_operation(
            "process",
            Some(contact.batch_id),
            Some(contact_id),
            contact.status.as_str(),
            contact.error_message.as_deref(),
        );
        Ok(outcome)
    }

    /// Both lookups, recorded onto the contact. Absent inputs are not looked up.
    async fn enrich(&self, contact: &mut Contact) -> Result<()> {
        if let Some(email) = contact.email.clone() {
            let check = match self.client.validate_email(&email).await? {
                LookupOutcome::Resolved(EmailLookup { valid: true }) => EmailCheck::Valid,
                LookupOutcome::Resolved(EmailLookup { valid: false }) => EmailCheck::Invalid,
                LookupOutcome::Unavailable { reason } => {
                    debug!(contact_id = contact.contact_id, reason = %reason, "Email check unavailable");
                    EmailCheck::Unavailable
                }
            };
            contact.record_email_check(check);
        }

        if let Some(company) = contact.company.clone() {
            match self.client.lookup_company(&company).await? {
                LookupOutcome::Resolved(profile) => contact.record_company_profile(profile),
                LookupOutcome::Unavailable { reason } => {
                    debug!(contact_id = contact.contact_id, reason = %reason, "Company lookup unavailable");
                }
            }
        }

        Ok(())
    }

    async fn finish_batch(&self, unit: BatchWorkUnit, result: &BatchResult) -> Result<()> {
        let event = if result.is_clean() {
            BatchEvent::Complete
        } else {
            BatchEvent::Fail(format!("{} contacts failed", result.failed))
        };
        let status = BatchStateMachine::determine_target_state(ProcessingState::InProgress, &event)?;

        let completion = BatchCompletion {
            status,
            processed_count: unit.total_count - result.failed,
            completed_at: Utc::now(),
        };

        match self
            .store
            .finalize_batch(unit.batch_id, ProcessingState::InProgress, completion)
            .await
        {
            Ok(_) => {}
            Err(EnrichmentError::StateTransitionError(message)) => {
                // already failed by the staleness sweep; the contacts still count
                warn!(batch_id = unit.batch_id, reason = %message, "Batch finalized elsewhere");
            }
            Err(e) => return Err(e),
        }

        let event_name = if status == ProcessingState::Success {
            events::BATCH_COMPLETED
        } else {
            events::BATCH_FAILED
        };
        let _ = self
            .events
            .publish(
                event_name,
                json!({
                    "job_id": unit.job_id,
                    "batch_id": unit.batch_id,
                    "batch_number": unit.batch_number,
                    "success": result.success,
                    "failed": result.failed,
                }),
            )
            .await;

        log_batch_operation(
            "finalize",
            Some(unit.job_id),
            Some(unit.batch_id),
            Some(unit.batch_number),
            status.as_str(),
            Some(&format!("success={} failed={}", result.success, result.failed)),
        );
        Ok(())
    }

    /// Counts as they stand in storage, for batches this execution did not run
    async fn stored_result(&self, unit: BatchWorkUnit) -> Result<BatchResult> {
        let contacts = self.store.list_contacts(unit.batch_id).await?;
        Ok(result_from_contacts(unit.batch_id, &contacts))
    }

    async fn try_abandon(&self, unit: BatchWorkUnit, reason: &str) -> Result<BatchResult> {
        let contacts = self.store.list_contacts(unit.batch_id).await?;
        let now = Utc::now();

        for contact in contacts.iter().filter(|c| !c.status.is_terminal()) {
            let mut failed = contact.clone();
            failed.status = ContactStateMachine::determine_target_state(
                contact.status,
                &ContactEvent::Fail(reason.to_string()),
            )?;
            failed.error_message = Some(reason.to_string());
            failed.processed_at = Some(now);
            self.store.save_contact(&failed, contact.status).await?;
        }

        // re-read so contacts that settled concurrently are counted as stored
        let contacts = self.store.list_contacts(unit.batch_id).await?;
        let result = result_from_contacts(unit.batch_id, &contacts);

        if let Some(batch) = self.store.find_batch(unit.batch_id).await? {
            if !batch.is_terminal() {
                let status = BatchStateMachine::determine_target_state(
                    batch.status,
                    &BatchEvent::Fail(reason.to_string()),
                )?;
                let completion = BatchCompletion {
                    status,
                    processed_count: batch.total_count - result.failed,
                    completed_at: now,
                };
                if let Err(e) = self
                    .store
                    .finalize_batch(unit.batch_id, batch.status, completion)
                    .await
                {
                    warn!(batch_id = unit.batch_id, error = %e, "Could not fail abandoned batch");
                }
            }
        }

        Ok(result)
    }
}

/// Roll stored contact statuses into a result. Anything not SUCCESS counts as failed.
fn result_from_contacts(batch_id: i64, contacts: &[Contact]) -> BatchResult {
    let error_contact_ids: Vec<i64> = contacts
        .iter()
        .filter(|c| c.status != ProcessingState::Success)
        .map(|c| c.contact_id)
        .collect();
    let failed = error_contact_ids.len() as i64;

    BatchResult {
        batch_id,
        processed: contacts.len() as i64,
        success: contacts.len() as i64 - failed,
        failed,
        error_contact_ids,
    }
}

/// Result for a batch whose contacts could not even be read back
fn total_loss(unit: BatchWorkUnit) -> BatchResult {
    BatchResult {
        batch_id: unit.batch_id,
        processed: unit.total_count,
        success: 0,
        failed: unit.total_count,
        error_contact_ids: Vec::new(),
    }
}

#[async_trait]
impl BatchExecutor for BatchWorker {
    async fn execute(&self, unit: BatchWorkUnit) -> BatchResult {
        match self.process(unit).await {
            Ok(result) => result,
            Err(e) => {
                log_error(
                    "BatchWorker",
                    "process",
                    &e.to_string(),
                    Some(&format!("job_id={} batch_id={}", unit.job_id, unit.batch_id)),
                );
                self.abandon(unit, &format!("batch worker error: {e}")).await
            }
        }
    }

    async fn abandon(&self, unit: BatchWorkUnit, reason: &str) -> BatchResult {
        let result = match self.try_abandon(unit, reason).await {
            Ok(result) => result,
            Err(e) => {
                log_error(
                    "BatchWorker",
                    "abandon",
                    &e.to_string(),
                    Some(&format!("job_id={} batch_id={}", unit.job_id, unit.batch_id)),
                );
                total_loss(unit)
            }
        };

        let _ = self
            .events
            .publish(
                events::BATCH_FAILED,
                json!({
                    "job_id": unit.job_id,
                    "batch_id": unit.batch_id,
                    "batch_number": unit.batch_number,
                    "reason": reason,
                    "success": result.success,
                    "failed": result.failed,
                }),
            )
            .await;

        log_batch_operation(
            "abandon",
            Some(unit.job_id),
            Some(unit.batch_id),
            Some(unit.batch_number),
            ProcessingState::Failed.as_str(),
            Some(reason),
        );
        result
    }
}

//! # Staleness Detector
//!
//! Reconciles work orphaned by workers that died or were cut off by the batch
//! time limit without their batch being abandoned. Contacts IN_PROGRESS whose
//! claim is older than the lease are failed with
//! `"orphaned: lease expired"`; batches IN_PROGRESS past the lease are failed
//! too.
//!
//! The lease must exceed the batch time limit (enforced by config validation)
//! so live workers are never swept.

use crate::config::StalenessConfig;
use crate::constants::{events, system};
use crate::database::{BatchCompletion, JobStore};
use crate::error::Result;
use crate::events::EventPublisher;
use crate::state_machine::{
    BatchEvent, BatchStateMachine, ContactEvent, ContactStateMachine, ProcessingState,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// What one sweep changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub contacts_reclaimed: usize,
    pub batches_failed: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.contacts_reclaimed == 0 && self.batches_failed == 0
    }
}

#[derive(Clone)]
pub struct StalenessDetector {
    store: Arc<dyn JobStore>,
    config: StalenessConfig,
    events: EventPublisher,
}

impl std::fmt::Debug for StalenessDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StalenessDetector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StalenessDetector {
    pub fn new(store: Arc<dyn JobStore>, config: StalenessConfig, events: EventPublisher) -> Self {
        Self {
            store,
            config,
            events,
        }
    }

    pub fn config(&self) -> &StalenessConfig {
        &self.config
    }

    /// Run sweeps on the configured interval until `shutdown` flips to true.
    ///
    /// A failed sweep is logged and does not stop the loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval_timer = interval(self.config.detection_interval());

        info!(
            interval_seconds = self.config.detection_interval_seconds,
            lease_seconds = self.config.lease_seconds,
            "Starting staleness detector"
        );

        loop {
            tokio::select! {
                _ = interval_timer.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if !report.is_empty() => info!(
                            contacts_reclaimed = report.contacts_reclaimed,
                            batches_failed = report.batches_failed,
                            "Staleness sweep completed"
                        ),
                        Ok(_) => debug!("No stale work detected this cycle"),
                        Err(e) => error!(error = %e, "Staleness sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Staleness detector stopping");
                        return;
                    }
                }
            }
        }
    }

    /// One reconciliation pass over contacts and batches
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let lease = chrono::Duration::from_std(self.config.lease())
            .unwrap_or_else(|_| chrono::Duration::seconds(self.config.lease_seconds as i64));
        self.sweep_older_than(lease).await
    }

    async fn sweep_older_than(&self, lease: chrono::Duration) -> Result<SweepReport> {
        let now = Utc::now();
        let cutoff = now - lease;
        let mut report = SweepReport::default();

        for contact in self.store.stale_contacts(cutoff).await? {
            let reason = system::ORPHANED_CONTACT_ERROR.to_string();
            let mut failed = contact.clone();
            failed.status = ContactStateMachine::determine_target_state(
                contact.status,
                &ContactEvent::Fail(reason.clone()),
            )?;
            failed.error_message = Some(reason);
            failed.processed_at = Some(now);

            if self
                .store
                .save_contact(&failed, ProcessingState::InProgress)
                .await?
            {
                report.contacts_reclaimed += 1;
                warn!(
                    job_id = contact.job_id,
                    batch_id = contact.batch_id,
                    contact_id = contact.contact_id,
                    "Reclaimed orphaned contact"
                );
            }
        }

        for batch in self.store.stale_batches(cutoff).await? {
            let status = BatchStateMachine::determine_target_state(
                batch.status,
                &BatchEvent::Fail("lease expired".to_string()),
            )?;
            let contacts = self.store.list_contacts(batch.batch_id).await?;
            let failed = contacts
                .iter()
                .filter(|c| c.status != ProcessingState::Success)
                .count() as i64;

            match self
                .store
                .finalize_batch(
                    batch.batch_id,
                    ProcessingState::InProgress,
                    BatchCompletion {
                        status,
                        processed_count: batch.total_count - failed,
                        completed_at: now,
                    },
                )
                .await
            {
                Ok(_) => {
                    report.batches_failed += 1;
                    warn!(
                        job_id = batch.job_id,
                        batch_id = batch.batch_id,
                        "Failed batch left in progress past its lease"
                    );
                }
                Err(e) => debug!(batch_id = batch.batch_id, error = %e, "Batch settled during sweep"),
            }
        }

        if !report.is_empty() {
            let _ = self
                .events
                .publish(
                    events::CONTACTS_RECLAIMED,
                    json!({
                        "contacts_reclaimed": report.contacts_reclaimed,
                        "batches_failed": report.batches_failed,
                    }),
                )
                .await;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryJobStore;
    use crate::models::{ContactRecord, NewBatch, NewContact, NewJob};
    use std::time::Duration;

    async fn seeded_store() -> (Arc<InMemoryJobStore>, i64) {
        let store = Arc::new(InMemoryJobStore::new());
        let job = store
            .create_job(NewJob {
                filename: "contacts.csv".into(),
                total_count: 2,
            })
            .await
            .unwrap();
        let contacts = ["a", "b"]
            .iter()
            .map(|name| {
                NewContact::from_record(
                    job.job_id,
                    &ContactRecord {
                        name: name.to_string(),
                        ..Default::default()
                    },
                )
            })
            .collect();
        let batch = store
            .create_batch_with_contacts(
                NewBatch {
                    job_id: job.job_id,
                    batch_number: 0,
                    total_count: 2,
                },
                contacts,
            )
            .await
            .unwrap();
        (store, batch.batch_id)
    }

    #[tokio::test]
    async fn test_sweep_reclaims_expired_claims_only() {
        let (store, batch_id) = seeded_store().await;
        let long_ago = Utc::now() - chrono::Duration::hours(2);
        store.mark_batch_started(batch_id, long_ago).await.unwrap();

        let contacts = store.pending_contacts(batch_id).await.unwrap();
        let mut stale = contacts[0].clone();
        stale.status = ProcessingState::InProgress;
        stale.claimed_at = Some(long_ago);
        store.save_contact(&stale, ProcessingState::Pending).await.unwrap();

        let mut fresh = contacts[1].clone();
        fresh.status = ProcessingState::InProgress;
        fresh.claimed_at = Some(Utc::now());
        store.save_contact(&fresh, ProcessingState::Pending).await.unwrap();

        let detector = StalenessDetector::new(
            store.clone(),
            StalenessConfig {
                enabled: true,
                detection_interval_seconds: 60,
                lease_seconds: 900,
            },
            EventPublisher::default(),
        );

        let report = detector.sweep_once().await.unwrap();
        assert_eq!(report.contacts_reclaimed, 1);
        assert_eq!(report.batches_failed, 1);

        let contacts = store.list_contacts(batch_id).await.unwrap();
        assert_eq!(contacts[0].status, ProcessingState::Failed);
        assert_eq!(
            contacts[0].error_message.as_deref(),
            Some(system::ORPHANED_CONTACT_ERROR)
        );
        assert_eq!(contacts[1].status, ProcessingState::InProgress);

        let batch = store.find_batch(batch_id).await.unwrap().unwrap();
        assert_eq!(batch.status, ProcessingState::Failed);

        // nothing left to do
        assert!(detector.sweep_once().await.unwrap().contacts_reclaimed == 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (store, _) = seeded_store().await;
        let detector = StalenessDetector::new(
            store,
            StalenessConfig {
                enabled: true,
                detection_interval_seconds: 3600,
                lease_seconds: 7200,
            },
            EventPublisher::default(),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move { detector.run(shutdown_rx).await });

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}

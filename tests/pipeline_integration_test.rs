//! End-to-end pipeline runs over the in-memory store: upload, split, fan out,
//! enrich, barrier, aggregate.

mod common;

use common::*;
use contact_enrichment::constants::events;
use contact_enrichment::database::JobStore;
use contact_enrichment::intake::ResultsAvailability;
use contact_enrichment::models::EmailCheck;
use contact_enrichment::state_machine::ProcessingState;
use contact_enrichment::EnrichmentError;
use std::time::Duration;

#[tokio::test]
async fn test_five_rows_run_as_three_batches_and_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let pipeline = pipeline(&config, ScriptedEnrichmentClient::new());

    let (receipt, handle) = pipeline
        .intake
        .accept_upload("contacts.csv", &numbered_csv(5))
        .await
        .unwrap();
    assert_eq!(receipt.total_count, 5);
    assert_eq!(
        receipt.message,
        "File uploaded successfully. Processing started."
    );

    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.status, ProcessingState::Success);
    assert_eq!(summary.success, 5);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.batch_count, 3);

    let batches = pipeline.store.list_batches(receipt.job_id).await.unwrap();
    let sizes: Vec<i64> = batches.iter().map(|b| b.total_count).collect();
    let numbers: Vec<i32> = batches.iter().map(|b| b.batch_number).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(numbers, vec![0, 1, 2]);
    assert!(batches
        .iter()
        .all(|b| b.status == ProcessingState::Success && b.processed_count == b.total_count));

    let job = pipeline.store.find_job(receipt.job_id).await.unwrap().unwrap();
    assert_eq!(job.success_count + job.failure_count, job.total_count);
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());

    let status = pipeline.intake.job_status(receipt.job_id).await.unwrap();
    assert_eq!(status.status, ProcessingState::Success);
    assert_eq!(status.completion_percentage, 100.0);

    // staged under the job-keyed name
    assert!(dir
        .path()
        .join(format!("job_{}_contacts.csv", receipt.job_id))
        .exists());
}

#[tokio::test]
async fn test_failing_contact_taints_batch_but_not_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let client = ScriptedEnrichmentClient::new().with_failing_company("Broken Corp");
    let pipeline = pipeline(&config, client);

    let csv = csv_bytes(&[
        ("Ada", "ada@example.com", "Acme"),
        ("Bob", "bob@example.com", "Broken Corp"),
        ("Cy", "cy@example.com", "Acme"),
        ("Di", "di@example.com", "Acme"),
        ("Ed", "ed@example.com", "Acme"),
    ]);
    let (receipt, handle) = pipeline.intake.accept_upload("contacts.csv", &csv).await.unwrap();
    let summary = handle.wait().await.unwrap();

    assert_eq!(summary.status, ProcessingState::Failed);
    assert_eq!(summary.success, 4);
    assert_eq!(summary.failed, 1);

    let batches = pipeline.store.list_batches(receipt.job_id).await.unwrap();
    assert_eq!(batches[0].status, ProcessingState::Failed);
    assert_eq!(batches[0].processed_count, 1);
    assert_eq!(batches[1].status, ProcessingState::Success);
    assert_eq!(batches[2].status, ProcessingState::Success);

    let contacts = pipeline.store.list_contacts(batches[0].batch_id).await.unwrap();
    assert_eq!(contacts[0].status, ProcessingState::Success);
    assert_eq!(contacts[0].company_domain.as_deref(), Some("acme.com"));
    assert_eq!(contacts[1].status, ProcessingState::Failed);
    assert!(contacts[1]
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("Broken Corp")));
    // the email was validated before the company lookup blew up
    assert!(pipeline
        .client
        .calls()
        .contains(&"email:bob@example.com".to_string()));

    let job = pipeline.store.find_job(receipt.job_id).await.unwrap().unwrap();
    assert_eq!(job.success_count, 4);
    assert_eq!(job.failure_count, 1);
    assert_eq!(
        pipeline.intake.job_status(receipt.job_id).await.unwrap().completion_percentage,
        100.0
    );
}

#[tokio::test]
async fn test_blank_contact_succeeds_without_lookups() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let pipeline = pipeline(&config, ScriptedEnrichmentClient::new());

    let (receipt, handle) = pipeline
        .intake
        .accept_upload("contacts.csv", b"name,email,company,phone\nNobody,,,\n")
        .await
        .unwrap();
    handle.wait().await.unwrap();

    let contacts = pipeline.store.list_job_contacts(receipt.job_id).await.unwrap();
    assert_eq!(contacts.len(), 1);
    let contact = &contacts[0];
    assert_eq!(contact.status, ProcessingState::Success);
    assert!(!contact.email_valid);
    assert_eq!(contact.email_check, EmailCheck::NotAttempted);
    assert_eq!(contact.company_domain, None);
    assert_eq!(contact.company_size, None);
    assert_eq!(contact.company_location, None);
    assert!(contact.processed_at.is_some());
    assert!(pipeline.client.calls().is_empty());
}

#[tokio::test]
async fn test_unavailable_provider_is_not_a_contact_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let client = ScriptedEnrichmentClient::new()
        .with_unavailable_email("slow@example.com")
        .with_invalid_email("bogus@example.com");
    let pipeline = pipeline(&config, client);

    let csv = csv_bytes(&[
        ("Slow", "slow@example.com", ""),
        ("Bogus", "bogus@example.com", ""),
        ("Good", "good@example.com", ""),
    ]);
    let (receipt, handle) = pipeline.intake.accept_upload("leads.CSV", &csv).await.unwrap();
    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.status, ProcessingState::Success);

    let contacts = pipeline.store.list_job_contacts(receipt.job_id).await.unwrap();
    let checks: Vec<(EmailCheck, bool)> = contacts
        .iter()
        .map(|c| (c.email_check, c.email_valid))
        .collect();
    assert_eq!(
        checks,
        vec![
            (EmailCheck::Unavailable, false),
            (EmailCheck::Invalid, false),
            (EmailCheck::Valid, true),
        ]
    );
}

#[tokio::test]
async fn test_header_only_file_completes_empty() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let pipeline = pipeline(&config, ScriptedEnrichmentClient::new());
    let mut receiver = pipeline.events.subscribe();

    let (receipt, handle) = pipeline
        .intake
        .accept_upload("empty.csv", b"name,email,company,phone\n")
        .await
        .unwrap();
    assert_eq!(receipt.total_count, 0);

    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.status, ProcessingState::Success);
    assert_eq!(summary.batch_count, 0);

    let status = pipeline.intake.job_status(receipt.job_id).await.unwrap();
    assert_eq!(status.completion_percentage, 100.0);

    let published = drain_events(&mut receiver);
    assert_eq!(
        published
            .iter()
            .filter(|e| e.name == events::JOB_COMPLETED)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_results_pending_until_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let client = ScriptedEnrichmentClient::new().with_delay(Duration::from_millis(100));
    let pipeline = pipeline(&config, client);

    let (receipt, handle) = pipeline
        .intake
        .accept_upload("contacts.csv", &numbered_csv(3))
        .await
        .unwrap();

    let early = pipeline.intake.job_results(receipt.job_id).await.unwrap();
    assert_eq!(early, ResultsAvailability::Pending);
    let early_status = pipeline.intake.job_status(receipt.job_id).await.unwrap();
    assert!(!early_status.status.is_terminal());
    assert!(early_status.completion_percentage < 100.0);

    handle.wait().await.unwrap();

    match pipeline.intake.job_results(receipt.job_id).await.unwrap() {
        ResultsAvailability::Ready(summary) => {
            assert_eq!(summary.success, 3);
            assert_eq!(summary.batch_count, 2);
        }
        other => panic!("expected ready results, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rejects_non_csv_upload() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let pipeline = pipeline(&config, ScriptedEnrichmentClient::new());

    let err = pipeline
        .intake
        .accept_upload("contacts.xlsx", &numbered_csv(2))
        .await
        .unwrap_err();
    assert!(matches!(err, EnrichmentError::ValidationError(_)));

    let err = pipeline
        .intake
        .accept_upload("contacts.csv", &[0xff, 0xfe, 0x00, 0x41])
        .await
        .unwrap_err();
    assert!(matches!(err, EnrichmentError::ValidationError(_)));

    // nothing entered the pipeline
    assert!(pipeline.store.find_job(1).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_job_queries_are_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let pipeline = pipeline(&config, ScriptedEnrichmentClient::new());

    assert!(pipeline.intake.job_status(999).await.unwrap_err().is_not_found());
    assert!(pipeline.intake.job_results(999).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_lifecycle_events_fire_once_per_job_and_batch() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let pipeline = pipeline(&config, ScriptedEnrichmentClient::new());
    let mut receiver = pipeline.events.subscribe();

    let (receipt, handle) = pipeline
        .intake
        .accept_upload("contacts.csv", &numbered_csv(7))
        .await
        .unwrap();
    handle.wait().await.unwrap();

    let published = drain_events(&mut receiver);
    let count = |name: &str| published.iter().filter(|e| e.name == name).count();
    assert_eq!(count(events::JOB_STARTED), 1);
    assert_eq!(count(events::BATCH_STARTED), 4);
    assert_eq!(count(events::BATCH_COMPLETED), 4);
    assert_eq!(count(events::JOB_COMPLETED), 1);
    assert_eq!(count(events::JOB_FAILED), 0);

    let completed = published
        .iter()
        .find(|e| e.name == events::JOB_COMPLETED)
        .unwrap();
    assert_eq!(completed.context_i64("job_id"), Some(receipt.job_id));
    assert_eq!(completed.context_i64("success"), Some(7));
}

#[tokio::test]
async fn test_staging_failure_fails_the_new_job() {
    let dir = tempfile::tempdir().unwrap();
    // the upload root sits below a regular file, so it can never be created
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"").unwrap();
    let config = test_config(&blocker.join("uploads"));
    let pipeline = pipeline(&config, ScriptedEnrichmentClient::new());

    let err = pipeline
        .intake
        .accept_upload("contacts.csv", &numbered_csv(3))
        .await
        .unwrap_err();
    assert!(matches!(err, EnrichmentError::StagingError(_)));

    // first job created by a fresh store
    let job = pipeline.store.find_job(1).await.unwrap().unwrap();
    assert_eq!(job.status, ProcessingState::Failed);
    assert_eq!(job.success_count, 0);
    assert_eq!(job.failure_count, 3);
    assert!(job.completed_at.is_some());
}

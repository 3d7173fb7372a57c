//! Shared helpers for integration tests: CSV builders, a scripted enrichment
//! client and pipeline wiring over the in-memory store.

#![allow(dead_code)]

use async_trait::async_trait;
use contact_enrichment::config::EnrichmentConfig;
use contact_enrichment::database::InMemoryJobStore;
use contact_enrichment::enrichment::{
    CompanyProfile, EmailLookup, EnrichmentClient, LookupOutcome,
};
use contact_enrichment::error::{EnrichmentError, Result};
use contact_enrichment::events::{EventPublisher, PublishedEvent};
use contact_enrichment::intake::IntakeService;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Build CSV bytes with the standard header from (name, email, company) rows
pub fn csv_bytes(rows: &[(&str, &str, &str)]) -> Vec<u8> {
    let mut out = String::from("name,email,company,phone\n");
    for (name, email, company) in rows {
        out.push_str(&format!("{name},{email},{company},555-0100\n"));
    }
    out.into_bytes()
}

/// `count` rows named contact-0.. with distinct emails and a shared company
pub fn numbered_csv(count: usize) -> Vec<u8> {
    let rows: Vec<(String, String)> = (0..count)
        .map(|n| (format!("contact-{n}"), format!("contact{n}@example.com")))
        .collect();
    let borrowed: Vec<(&str, &str, &str)> = rows
        .iter()
        .map(|(name, email)| (name.as_str(), email.as_str(), "Acme"))
        .collect();
    csv_bytes(&borrowed)
}

/// Enrichment client whose answers are scripted per input value
#[derive(Default)]
pub struct ScriptedEnrichmentClient {
    invalid_emails: HashSet<String>,
    unavailable_emails: HashSet<String>,
    failing_companies: HashSet<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedEnrichmentClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_invalid_email(mut self, email: &str) -> Self {
        self.invalid_emails.insert(email.to_string());
        self
    }

    pub fn with_unavailable_email(mut self, email: &str) -> Self {
        self.unavailable_emails.insert(email.to_string());
        self
    }

    /// Company lookups for `company` return an error, failing the contact
    pub fn with_failing_company(mut self, company: &str) -> Self {
        self.failing_companies.insert(company.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every lookup made, as `"email:<value>"` or `"company:<value>"`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl EnrichmentClient for ScriptedEnrichmentClient {
    async fn validate_email(&self, email: &str) -> Result<LookupOutcome<EmailLookup>> {
        self.calls.lock().push(format!("email:{email}"));
        self.pause().await;

        if self.unavailable_emails.contains(email) {
            return Ok(LookupOutcome::unavailable("validate-email returned 503"));
        }
        Ok(LookupOutcome::Resolved(EmailLookup {
            valid: !self.invalid_emails.contains(email),
        }))
    }

    async fn lookup_company(&self, company: &str) -> Result<LookupOutcome<CompanyProfile>> {
        self.calls.lock().push(format!("company:{company}"));
        self.pause().await;

        if self.failing_companies.contains(company) {
            return Err(EnrichmentError::ProviderError(format!(
                "company lookup exploded for {company}"
            )));
        }
        Ok(LookupOutcome::Resolved(CompanyProfile {
            domain: Some(format!("{}.com", company.to_lowercase())),
            size: Some("51-200".to_string()),
            location: Some("Berlin".to_string()),
        }))
    }
}

/// Configuration tuned for tests: tiny retry delays, staging under `upload_root`
pub fn test_config(upload_root: &Path) -> EnrichmentConfig {
    let mut config = EnrichmentConfig::default();
    config.staging.upload_root = upload_root.to_path_buf();
    config.backoff.base_delay_ms = 1;
    config.backoff.max_delay_ms = 5;
    config.backoff.jitter_enabled = false;
    config.execution.max_concurrent_batches = 4;
    config.execution.batch_time_limit_seconds = 10;
    config.staleness.lease_seconds = 60;
    config
}

pub struct TestPipeline {
    pub store: Arc<InMemoryJobStore>,
    pub client: Arc<ScriptedEnrichmentClient>,
    pub events: EventPublisher,
    pub intake: IntakeService,
}

pub fn pipeline(config: &EnrichmentConfig, client: ScriptedEnrichmentClient) -> TestPipeline {
    let store = Arc::new(InMemoryJobStore::new());
    let client = Arc::new(client);
    let events = EventPublisher::new(config.events.channel_capacity);
    let intake = IntakeService::from_config(config, store.clone(), client.clone(), events.clone())
        .expect("test configuration is valid");

    TestPipeline {
        store,
        client,
        events,
        intake,
    }
}

/// Everything published so far, without waiting
pub fn drain_events(receiver: &mut broadcast::Receiver<PublishedEvent>) -> Vec<PublishedEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

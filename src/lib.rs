#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Contact Enrichment
//!
//! Bulk contact enrichment as a fan-out/fan-in pipeline.
//!
//! ## Overview
//!
//! A user uploads a CSV of contacts. The upload becomes a **job**; its rows are
//! split into fixed-size **batches** that run in parallel. Each batch worker
//! enriches its contacts through an external provider (email validation and a
//! company profile lookup) and records a per-contact outcome. Once every batch
//! has reported, the aggregator rolls the counts up and moves the job to its
//! terminal state exactly once.
//!
//! ## Module Organization
//!
//! - [`intake`] - upload acceptance, status and results queries
//! - [`orchestration`] - splitter, dispatcher, batch worker, aggregator, staleness sweep
//! - [`enrichment`] - provider client trait and its HTTP implementation
//! - [`database`] - `JobStore` trait with in-memory and PostgreSQL implementations
//! - [`models`] - job, batch and contact records
//! - [`state_machine`] - status vocabulary and transition tables
//! - [`staging`] - where uploaded bytes wait for the orchestrator
//! - [`ingestion`] - CSV parsing
//! - [`config`] - YAML configuration with environment overrides
//! - [`events`] - lifecycle event broadcast
//! - [`error`] - structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use contact_enrichment::config::EnrichmentConfig;
//! use contact_enrichment::database::InMemoryJobStore;
//! use contact_enrichment::enrichment::HttpEnrichmentClient;
//! use contact_enrichment::events::EventPublisher;
//! use contact_enrichment::intake::IntakeService;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EnrichmentConfig::default();
//! let client = HttpEnrichmentClient::new(&config.enrichment)?;
//! let intake = IntakeService::from_config(
//!     &config,
//!     Arc::new(InMemoryJobStore::new()),
//!     Arc::new(client),
//!     EventPublisher::default(),
//! )?;
//!
//! let (receipt, handle) = intake
//!     .accept_upload("contacts.csv", b"name,email\nAda,ada@example.com\n")
//!     .await?;
//! let summary = handle.wait().await?;
//! println!("job {} finished as {}", receipt.job_id, summary.status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # All tests; PostgreSQL tests are #[ignore]d
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod enrichment;
pub mod error;
pub mod events;
pub mod ingestion;
pub mod intake;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod staging;
pub mod state_machine;

pub use config::{ConfigManager, EnrichmentConfig};
pub use constants::{status_groups, system};
// Re-export constants events with different name to avoid conflict
pub use constants::events as lifecycle_events;
pub use database::{InMemoryJobStore, JobStore, PgJobStore};
pub use enrichment::{EnrichmentClient, HttpEnrichmentClient, LookupOutcome};
pub use error::{EnrichmentError, Result};
pub use events::EventPublisher;
pub use intake::{IntakeService, JobStatusReport, ResultsAvailability, UploadReceipt};
pub use models::{Batch, BatchResult, Contact, Job, JobSummary};
pub use orchestration::{Aggregator, BatchWorker, JobOrchestrator, JobRunHandle, StalenessDetector};
pub use state_machine::ProcessingState;

//! # Orchestration Engine
//!
//! Fan-out/fan-in pipeline for enrichment jobs.
//!
//! ## Core Components
//!
//! - **BatchSplitter**: partitions parsed rows into fixed-size, numbered batches
//! - **JobOrchestrator**: materializes batches, starts the job and dispatches work
//! - **TokioDispatcher**: runs batch workers with bounded concurrency, a time
//!   limit per batch, and a barrier that yields one result per batch
//! - **BatchWorker**: enriches the contacts of one batch and finalizes it
//! - **Aggregator**: fan-in step that finalizes the job exactly once
//! - **StalenessDetector**: fails work orphaned past its lease
//! - **RetryPolicy**: exponential backoff with jitter for orchestration retries

pub mod aggregator;
pub mod backoff;
pub mod batch_splitter;
pub mod batch_worker;
pub mod dispatch;
pub mod job_orchestrator;
pub mod staleness_detector;

pub use aggregator::{summarize, AggregateCounts, Aggregator};
pub use backoff::RetryPolicy;
pub use batch_splitter::{BatchSlice, BatchSplitter};
pub use batch_worker::BatchWorker;
pub use dispatch::{BatchExecutor, BatchWorkUnit, DispatchHandle, TokioDispatcher, WorkDispatcher};
pub use job_orchestrator::{JobOrchestrator, JobRunHandle};
pub use staleness_detector::{StalenessDetector, SweepReport};

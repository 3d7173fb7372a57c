//! Lifecycle events for jobs, batches and contacts.
//!
//! Events are fire-and-forget notifications over a tokio broadcast channel.
//! Publishing never blocks and never fails when nobody is listening.

pub mod publisher;

pub use publisher::{EventPublisher, PublishError, PublishedEvent};

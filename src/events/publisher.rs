use serde_json::Value;
use tokio::sync::broadcast;

/// Event publisher for pipeline lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub name: String,
    pub context: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl PublishedEvent {
    /// Read an integer field from the event context
    pub fn context_i64(&self, field: &str) -> Option<i64> {
        self.context.get(field).and_then(Value::as_i64)
    }
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event with the given name and context
    pub async fn publish(
        &self,
        event_name: impl Into<String>,
        context: Value,
    ) -> Result<(), PublishError> {
        let event = PublishedEvent {
            name: event_name.into(),
            context,
            published_at: chrono::Utc::now(),
        };

        tracing::trace!(event = %event.name, "Publishing lifecycle event");

        // SendError only means there are no subscribers right now
        let _ = self.sender.send(event);
        Ok(())
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Error types for event publishing
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Event channel is closed")]
    ChannelClosed,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::events;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_without_subscribers_succeeds() {
        let publisher = EventPublisher::new(4);
        assert_eq!(publisher.subscriber_count(), 0);
        assert!(publisher
            .publish(events::JOB_STARTED, json!({"job_id": 1}))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_subscriber_receives_context() {
        let publisher = EventPublisher::new(4);
        let mut receiver = publisher.subscribe();

        publisher
            .publish(events::BATCH_COMPLETED, json!({"job_id": 9, "batch_id": 3}))
            .await
            .unwrap();

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.name, events::BATCH_COMPLETED);
        assert_eq!(event.context_i64("batch_id"), Some(3));
        assert_eq!(event.context_i64("missing"), None);
    }
}

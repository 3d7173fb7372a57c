//! Error types for the enrichment pipeline.
//!
//! Errors are recovered at the lowest level possible. Per-contact failures never
//! surface here: the batch worker records them on the contact and rolls them up
//! as counts. What remains are storage, staging, configuration and orchestration
//! failures, each of which knows whether retrying could help.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnrichmentError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("State transition error: {0}")]
    StateTransitionError(String),
    #[error("Orchestration error: {0}")]
    OrchestrationError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Staging error: {0}")]
    StagingError(String),
    #[error("Enrichment provider error: {0}")]
    ProviderError(String),
    #[error("Timeout error: {0}")]
    Timeout(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EnrichmentError {
    /// Build a not-found error for a job id.
    pub fn job_not_found(id: i64) -> Self {
        Self::NotFound { entity: "Job", id }
    }

    /// Build a not-found error for a batch id.
    pub fn batch_not_found(id: i64) -> Self {
        Self::NotFound { entity: "Batch", id }
    }

    /// Build a not-found error for a contact id.
    pub fn contact_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "Contact",
            id,
        }
    }

    /// Whether the failure may clear up on its own, making a retry worthwhile.
    ///
    /// Fatal errors (unknown ids, invalid input, invalid state, bad configuration)
    /// fail the task permanently.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError(_) | Self::StagingError(_) | Self::ProviderError(_) | Self::Timeout(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<sqlx::Error> for EnrichmentError {
    fn from(err: sqlx::Error) -> Self {
        EnrichmentError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for EnrichmentError {
    fn from(err: serde_json::Error) -> Self {
        EnrichmentError::ValidationError(format!("JSON serialization error: {err}"))
    }
}

impl From<csv::Error> for EnrichmentError {
    fn from(err: csv::Error) -> Self {
        EnrichmentError::ValidationError(format!("CSV parse error: {err}"))
    }
}

impl From<std::io::Error> for EnrichmentError {
    fn from(err: std::io::Error) -> Self {
        EnrichmentError::StagingError(err.to_string())
    }
}

impl From<crate::config::ConfigurationError> for EnrichmentError {
    fn from(err: crate::config::ConfigurationError) -> Self {
        EnrichmentError::ConfigurationError(err.to_string())
    }
}

impl From<crate::state_machine::StateMachineError> for EnrichmentError {
    fn from(err: crate::state_machine::StateMachineError) -> Self {
        EnrichmentError::StateTransitionError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EnrichmentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EnrichmentError::DatabaseError("connection reset".into()).is_transient());
        assert!(EnrichmentError::StagingError("disk full".into()).is_transient());
        assert!(EnrichmentError::Timeout("batch 3".into()).is_transient());
        assert!(!EnrichmentError::job_not_found(42).is_transient());
        assert!(!EnrichmentError::ValidationError("not a csv".into()).is_transient());
        assert!(!EnrichmentError::StateTransitionError("terminal".into()).is_transient());
    }

    #[test]
    fn test_not_found_display() {
        let err = EnrichmentError::batch_not_found(7);
        assert_eq!(err.to_string(), "Batch 7 not found");
        assert!(err.is_not_found());
    }
}

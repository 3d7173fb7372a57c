use thiserror::Error;

/// Errors raised when a requested transition is not allowed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateMachineError {
    #[error("Invalid {entity} transition from {from} on event '{event}'")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        event: String,
    },

    #[error("Guard condition failed: {reason}")]
    GuardFailed { reason: String },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;

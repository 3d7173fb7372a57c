use super::errors::{StateMachineError, StateMachineResult};
use super::events::{BatchEvent, ContactEvent, JobEvent};
use super::states::ProcessingState;

/// Transition table for jobs.
///
/// PENDING -> IN_PROGRESS happens once dispatch begins. Terminal states are only
/// reached through aggregation, or through an abort when orchestration gives up
/// before anything was dispatched.
pub struct JobStateMachine;

impl JobStateMachine {
    pub fn determine_target_state(
        current: ProcessingState,
        event: &JobEvent,
    ) -> StateMachineResult<ProcessingState> {
        let target = match (current, event) {
            (ProcessingState::Pending, JobEvent::Start) => ProcessingState::InProgress,
            (ProcessingState::InProgress, JobEvent::Complete) => ProcessingState::Success,
            (ProcessingState::InProgress, JobEvent::Fail(_)) => ProcessingState::Failed,
            (ProcessingState::Pending, JobEvent::Fail(_)) => ProcessingState::Failed,
            (from, event) => {
                return Err(StateMachineError::InvalidTransition {
                    entity: "job",
                    from: from.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}

/// Transition table for batches.
pub struct BatchStateMachine;

impl BatchStateMachine {
    pub fn determine_target_state(
        current: ProcessingState,
        event: &BatchEvent,
    ) -> StateMachineResult<ProcessingState> {
        let target = match (current, event) {
            (ProcessingState::Pending, BatchEvent::Start) => ProcessingState::InProgress,
            (ProcessingState::InProgress, BatchEvent::Complete) => ProcessingState::Success,
            (ProcessingState::InProgress, BatchEvent::Fail(_)) => ProcessingState::Failed,
            // abandoned before its worker ever started
            (ProcessingState::Pending, BatchEvent::Fail(_)) => ProcessingState::Failed,
            (from, event) => {
                return Err(StateMachineError::InvalidTransition {
                    entity: "batch",
                    from: from.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}

/// Transition table for contacts.
///
/// Contact status is monotonic: PENDING -> IN_PROGRESS -> {SUCCESS, FAILED}. A
/// pending contact can also be failed directly when its batch is abandoned.
pub struct ContactStateMachine;

impl ContactStateMachine {
    pub fn determine_target_state(
        current: ProcessingState,
        event: &ContactEvent,
    ) -> StateMachineResult<ProcessingState> {
        if let ContactEvent::Fail(message) = event {
            if message.trim().is_empty() {
                return Err(StateMachineError::GuardFailed {
                    reason: "failed contacts require a non-empty error message".to_string(),
                });
            }
        }

        let target = match (current, event) {
            (ProcessingState::Pending, ContactEvent::Start) => ProcessingState::InProgress,
            (ProcessingState::InProgress, ContactEvent::Succeed) => ProcessingState::Success,
            (ProcessingState::InProgress, ContactEvent::Fail(_)) => ProcessingState::Failed,
            (ProcessingState::Pending, ContactEvent::Fail(_)) => ProcessingState::Failed,
            (from, event) => {
                return Err(StateMachineError::InvalidTransition {
                    entity: "contact",
                    from: from.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}

// State machines for jobs, batches and contacts.
//
// All three entities share one status vocabulary. Each entity has its own event
// set and transition table; stores consult the table before writing a status so
// that transitions stay monotonic no matter which component asks.

pub mod errors;
pub mod events;
pub mod states;
pub mod transitions;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::{BatchEvent, ContactEvent, JobEvent};
pub use states::ProcessingState;
pub use transitions::{BatchStateMachine, ContactStateMachine, JobStateMachine};

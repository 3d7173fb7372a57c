//! # Data Model
//!
//! Plain records for the three levels the pipeline tracks. A [`Job`] owns its
//! [`Batch`]es and [`Contact`]s; a contact's batch is set once at creation and
//! never reassigned. Storage mapping lives in [`crate::database`].

pub mod batch;
pub mod batch_result;
pub mod contact;
pub mod job;

pub use batch::{Batch, NewBatch};
pub use batch_result::{BatchResult, JobSummary};
pub use contact::{Contact, ContactRecord, EmailCheck, NewContact};
pub use job::{Job, NewJob};

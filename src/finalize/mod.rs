//! Event Finalization Module
//!
//! Batch reconciliation run when an event's voting window has closed, and
//! the worker pool that executes it in the background.

mod job;
mod queue;

pub use job::{FinalizationJob, FinalizationReport};
pub use queue::{Job, JobDispatcher, JobSlot, JobStatus, JobTicket, RetryPolicy, WorkerPool};

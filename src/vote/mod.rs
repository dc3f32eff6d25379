//! Vote Recording Module
//!
//! Enforces at most one vote per voter per election event.

mod recorder;

pub use recorder::{VoteRecord, VoteRecorder};

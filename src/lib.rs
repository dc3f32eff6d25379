//! Diad - Election-Day Vote Recording Service
//!
//! Tracks voters through a campaign's verification pipeline and records
//! their participation on election day.
//!
//! # Architecture
//!
//! All state lives in a single SQLite database. Election events are
//! scheduled per campaign and at most one of them is active at a time;
//! only the active event admits votes, and each voter can be recorded at
//! most once per event. When an event closes, a background job marks every
//! confirmed voter without a vote record as `did_not_vote`.
//!
//! # Features
//!
//! - Election event registry (simulations and the real election)
//! - Race-free vote recording with a unique (voter, event) pair
//! - Chunked, idempotent finalization through a retrying job queue
//! - Append-only validation history for every status change
//! - HTTP API with Spanish user-facing error messages

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod finalize;
pub mod history;
pub mod id;
pub mod store;
pub mod vote;
pub mod voter;

#[cfg(test)]
mod testutil;

pub use config::DiadConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::DiadConfig;
    pub use crate::error::{Error, Result};
    pub use crate::event::{ElectionEvent, EventRegistry, EventType, NewElectionEvent};
    pub use crate::finalize::{FinalizationJob, Job, JobDispatcher, WorkerPool};
    pub use crate::id::{CampaignId, EventId, UserId, VoterId};
    pub use crate::store::Store;
    pub use crate::vote::VoteRecorder;
    pub use crate::voter::{VoterDirectory, VoterStatus};
}

//! Voter Module
//!
//! Voter status model and the directory the election-day core reads and
//! updates voters through.

mod directory;
mod status;

pub use directory::{NewVoter, Voter, VoterDirectory};
pub use status::VoterStatus;

pub(crate) use directory::{load, load_by_document};

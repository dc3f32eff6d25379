//! Voter Status Model
//!
//! Lifecycle of a voter through census validation, call verification,
//! survey confirmation and finally the election-day outcome.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Voter lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoterStatus {
    PendingReview,
    RejectedCensus,
    VerifiedCensus,
    CorrectionRequired,
    VerifiedCall,
    Confirmed,
    Voted,
    DidNotVote,
}

impl VoterStatus {
    pub const ALL: [VoterStatus; 8] = [
        VoterStatus::PendingReview,
        VoterStatus::RejectedCensus,
        VoterStatus::VerifiedCensus,
        VoterStatus::CorrectionRequired,
        VoterStatus::VerifiedCall,
        VoterStatus::Confirmed,
        VoterStatus::Voted,
        VoterStatus::DidNotVote,
    ];

    /// Statuses swept to `did_not_vote` when an event is finalized
    pub const AWAITING_VOTE: [VoterStatus; 2] = [VoterStatus::VerifiedCall, VoterStatus::Confirmed];

    pub fn as_str(&self) -> &'static str {
        match self {
            VoterStatus::PendingReview => "pending_review",
            VoterStatus::RejectedCensus => "rejected_census",
            VoterStatus::VerifiedCensus => "verified_census",
            VoterStatus::CorrectionRequired => "correction_required",
            VoterStatus::VerifiedCall => "verified_call",
            VoterStatus::Confirmed => "confirmed",
            VoterStatus::Voted => "voted",
            VoterStatus::DidNotVote => "did_not_vote",
        }
    }

    /// Set only by vote recording and event finalization
    pub fn is_election_outcome(&self) -> bool {
        matches!(self, VoterStatus::Voted | VoterStatus::DidNotVote)
    }

    /// Eligible to vote but no vote recorded yet
    pub fn is_awaiting_vote(&self) -> bool {
        Self::AWAITING_VOTE.contains(self)
    }

    /// Whether the verification pipeline may move a voter from `self` to `next`
    pub fn can_transition_to(&self, next: VoterStatus) -> bool {
        use VoterStatus::*;

        if next.is_election_outcome() {
            return false;
        }

        matches!(
            (self, next),
            (PendingReview, VerifiedCensus | RejectedCensus | CorrectionRequired)
                | (CorrectionRequired, PendingReview | VerifiedCensus | RejectedCensus)
                | (RejectedCensus, PendingReview | CorrectionRequired)
                | (VerifiedCensus, VerifiedCall | CorrectionRequired)
                | (VerifiedCall, Confirmed | CorrectionRequired)
        )
    }
}

impl fmt::Display for VoterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoterStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("estado de votante desconocido: {}", s)))
    }
}

impl ToSql for VoterStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for VoterStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

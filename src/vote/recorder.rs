//! Vote Recorder
//!
//! Records that a voter voted in an election event. The (voter, event) pair
//! is unique at the storage layer, so a concurrent second insert fails with
//! `DuplicateVote` no matter how the requests interleave.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::event;
use crate::id::{CampaignId, EventId, VoteRecordId, VoterId};
use crate::store::{is_unique_violation, Store};
use crate::voter::{self, VoterStatus};

/// Immutable fact: voter V voted in event E at time T
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRecord {
    pub id: VoteRecordId,
    pub voter_id: VoterId,
    pub campaign_id: CampaignId,
    pub election_event_id: EventId,
    pub voted_at: DateTime<Utc>,
}

/// Vote recording engine
pub struct VoteRecorder {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
}

impl VoteRecorder {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Record a vote and mark the voter as `voted`
    pub async fn record_vote(&self, voter_id: VoterId, event_id: EventId) -> Result<VoteRecordId> {
        let local_now = self.clock.local_now();
        let now = self.clock.now();

        let mut conn = self.store.conn().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let event = event::load(&tx, event_id)?.ok_or(Error::EventNotFound(event_id))?;
        if !event.admits_votes_at(local_now) {
            return Err(Error::EventNotAdmittingVotes(event_id));
        }

        let voter = voter::load(&tx, voter_id)?
            .ok_or_else(|| Error::VoterNotFound(voter_id.to_string()))?;
        if voter.campaign_id != event.campaign_id {
            return Err(Error::VoterNotInCampaign { voter_id, event_id });
        }

        let inserted = tx.execute(
            r#"
            INSERT INTO vote_records (voter_id, campaign_id, election_event_id, voted_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![voter_id, event.campaign_id, event_id, now],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!("Rejected duplicate vote for voter {} in event {}", voter_id, event_id);
                return Err(Error::DuplicateVote { voter_id, event_id });
            }
            Err(e) => return Err(e.into()),
        }
        let record_id = VoteRecordId(tx.last_insert_rowid());

        // Any prior status is overwritten, including did_not_vote
        tx.execute(
            "UPDATE voters SET status = ?1, voted_at = ?2, updated_at = ?2 WHERE id = ?3",
            params![VoterStatus::Voted, now, voter_id],
        )?;
        tx.commit()?;

        tracing::info!(
            "Recorded vote {} for voter {} in event {} (was {})",
            record_id,
            voter_id,
            event_id,
            voter.status
        );
        Ok(record_id)
    }

    /// Resolve a voter by document number within the event's campaign and record the vote
    pub async fn record_vote_by_document(
        &self,
        event_id: EventId,
        document_number: &str,
    ) -> Result<VoteRecordId> {
        let voter_id = {
            let conn = self.store.conn().await;
            let event = event::load(&conn, event_id)?.ok_or(Error::EventNotFound(event_id))?;
            voter::load_by_document(&conn, event.campaign_id, document_number)?
                .map(|v| v.id)
                .ok_or_else(|| Error::VoterNotFound(document_number.trim().to_string()))?
        };

        self.record_vote(voter_id, event_id).await
    }

    /// Manually mark a voter as `did_not_vote`; no vote record is written
    pub async fn mark_did_not_vote(&self, voter_id: VoterId) -> Result<()> {
        let now = self.clock.now();
        let conn = self.store.conn().await;
        let updated = conn.execute(
            "UPDATE voters SET status = ?1, voted_at = NULL, updated_at = ?2 WHERE id = ?3",
            params![VoterStatus::DidNotVote, now, voter_id],
        )?;
        if updated == 0 {
            return Err(Error::VoterNotFound(voter_id.to_string()));
        }

        tracing::info!("Voter {} marked as did_not_vote", voter_id);
        Ok(())
    }

    /// All vote records of a voter, oldest first
    pub async fn votes_for_voter(&self, voter_id: VoterId) -> Result<Vec<VoteRecord>> {
        let conn = self.store.conn().await;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, voter_id, campaign_id, election_event_id, voted_at
            FROM vote_records
            WHERE voter_id = ?1
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map(params![voter_id], |row| {
            Ok(VoteRecord {
                id: row.get(0)?,
                voter_id: row.get(1)?,
                campaign_id: row.get(2)?,
                election_event_id: row.get(3)?,
                voted_at: row.get(4)?,
            })
        })?;

        let mut records = Vec::new();
        for result in rows {
            records.push(result?);
        }

        Ok(records)
    }
}

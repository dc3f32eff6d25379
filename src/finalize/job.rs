//! Event Finalization
//!
//! Closes out an election event by marking every eligible voter without a
//! vote record for that event as `did_not_vote`. Voters are processed in
//! bounded chunks. A re-run selects nobody already handled, so restarting
//! from scratch after an interruption is safe.

use std::sync::Arc;

use rusqlite::{params, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::event::{self, ElectionEvent};
use crate::history::{self, HistoryEntry, ValidationType};
use crate::id::{EventId, UserId, VoterId};
use crate::store::Store;
use crate::voter::VoterStatus;

/// Outcome of one finalization run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizationReport {
    pub event_id: EventId,
    /// Event no longer exists; nothing was done
    pub skipped: bool,
    pub chunks: u64,
    pub marked: u64,
    pub failed: u64,
}

/// Finalization job runner
pub struct FinalizationJob {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    chunk_size: usize,
}

impl FinalizationJob {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>, chunk_size: usize) -> Self {
        Self {
            store,
            clock,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Run finalization for one event.
    ///
    /// A missing event is a no-op. An active event is refused with
    /// `EventStillActive`, since it may still admit votes. Per-voter failures
    /// are logged and counted without aborting the run; the report carries
    /// the count.
    pub async fn run(&self, event_id: EventId, validated_by: UserId) -> Result<FinalizationReport> {
        let mut report = FinalizationReport {
            event_id,
            ..Default::default()
        };

        let event = {
            let conn = self.store.conn().await;
            event::load(&conn, event_id)?
        };
        let event = match event {
            Some(event) => event,
            None => {
                tracing::debug!("Finalization skipped: event {} no longer exists", event_id);
                report.skipped = true;
                return Ok(report);
            }
        };

        if event.is_active {
            return Err(Error::EventStillActive(event_id));
        }

        tracing::info!("Finalizing event {} '{}' (campaign {})", event.id, event.name, event.campaign_id);
        let notes = format!("No votó en el evento electoral: {}", event.name);

        // Keyset cursor so failed voters are not selected again within this run
        let mut last_voter = VoterId(0);
        loop {
            let (processed, marked, failed, cursor) = {
                let mut conn = self.store.conn().await;
                let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                // Re-activated while the run was in progress
                if event::load(&tx, event_id)?.is_some_and(|e| e.is_active) {
                    tracing::warn!("Event {} was re-activated; stopping finalization", event_id);
                    return Err(Error::EventStillActive(event_id));
                }

                let chunk = select_chunk(&tx, &event, last_voter, self.chunk_size)?;
                if chunk.is_empty() {
                    break;
                }

                let mut marked = 0;
                let mut failed = 0;
                for &(voter_id, previous) in &chunk {
                    match self.mark_voter(&mut tx, voter_id, previous, validated_by, &notes) {
                        Ok(true) => marked += 1,
                        Ok(false) => {}
                        Err(e) => {
                            tracing::warn!("Failed to finalize voter {} for event {}: {}", voter_id, event_id, e);
                            failed += 1;
                        }
                    }
                }
                tx.commit()?;

                let cursor = chunk.last().map(|(id, _)| *id).unwrap_or(last_voter);
                (chunk.len(), marked, failed, cursor)
            };

            report.chunks += 1;
            report.marked += marked;
            report.failed += failed;
            last_voter = cursor;
            tracing::debug!(
                "Finalization chunk {} for event {}: {} selected, {} marked, {} failed",
                report.chunks,
                event_id,
                processed,
                marked,
                failed
            );

            // Let vote recording interleave between chunks
            tokio::task::yield_now().await;
        }

        tracing::info!(
            "Finalized event {}: {} voters marked did_not_vote, {} failed, {} chunks",
            event_id,
            report.marked,
            report.failed,
            report.chunks
        );
        Ok(report)
    }

    /// Transition one voter inside its own savepoint.
    ///
    /// Returns `Ok(false)` when the voter changed status since selection.
    fn mark_voter(
        &self,
        tx: &mut Transaction<'_>,
        voter_id: VoterId,
        previous: VoterStatus,
        validated_by: UserId,
        notes: &str,
    ) -> Result<bool> {
        let now = self.clock.now();
        let sp = tx.savepoint()?;

        let updated = sp.execute(
            r#"
            UPDATE voters SET status = ?1, voted_at = NULL, updated_at = ?2
            WHERE id = ?3 AND status = ?4
            "#,
            params![VoterStatus::DidNotVote, now, voter_id, previous],
        )?;
        if updated == 0 {
            return Ok(false);
        }

        history::append(
            &sp,
            &HistoryEntry {
                voter_id,
                previous_status: Some(previous),
                new_status: VoterStatus::DidNotVote,
                validated_by: Some(validated_by),
                validation_type: ValidationType::Election,
                notes: Some(notes),
                created_at: now,
            },
        )?;
        sp.commit()?;
        Ok(true)
    }
}

/// Eligible voters of the event's campaign with no vote record for the event
fn select_chunk(
    tx: &Transaction<'_>,
    event: &ElectionEvent,
    after: VoterId,
    limit: usize,
) -> Result<Vec<(VoterId, VoterStatus)>> {
    let mut stmt = tx.prepare(
        r#"
        SELECT v.id, v.status
        FROM voters v
        WHERE v.campaign_id = ?1
          AND v.status IN (?2, ?3)
          AND v.id > ?4
          AND NOT EXISTS (
              SELECT 1 FROM vote_records r
              WHERE r.voter_id = v.id AND r.election_event_id = ?5
          )
        ORDER BY v.id
        LIMIT ?6
        "#,
    )?;
    let [first, second] = VoterStatus::AWAITING_VOTE;
    let rows = stmt.query_map(
        params![event.campaign_id, first, second, after, event.id, limit as i64],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let mut chunk = Vec::new();
    for result in rows {
        chunk.push(result.map_err(Error::from)?);
    }

    Ok(chunk)
}

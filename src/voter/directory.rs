//! Voter Directory
//!
//! Minimal voter registry: registration, lookup by document number and
//! verification-pipeline transitions. Election outcomes are written by the
//! vote recorder and the finalization job, never through this type.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::history::{self, HistoryEntry, ValidationHistory, ValidationType};
use crate::id::{CampaignId, UserId, VoterId};
use crate::store::{is_unique_violation, Store};
use crate::voter::VoterStatus;

/// Voter record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voter {
    pub id: VoterId,
    pub campaign_id: CampaignId,
    pub document_number: String,
    pub full_name: String,
    pub status: VoterStatus,
    pub voted_at: Option<DateTime<Utc>>,
}

/// Registration input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVoter {
    pub campaign_id: CampaignId,
    pub document_number: String,
    pub full_name: String,
}

const VOTER_COLUMNS: &str = "id, campaign_id, document_number, full_name, status, voted_at";

fn voter_from_row(row: &Row<'_>) -> rusqlite::Result<Voter> {
    Ok(Voter {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        document_number: row.get(2)?,
        full_name: row.get(3)?,
        status: row.get(4)?,
        voted_at: row.get(5)?,
    })
}

/// Load a voter on the caller's connection or transaction
pub(crate) fn load(conn: &Connection, voter_id: VoterId) -> rusqlite::Result<Option<Voter>> {
    conn.query_row(
        &format!("SELECT {} FROM voters WHERE id = ?1", VOTER_COLUMNS),
        params![voter_id],
        voter_from_row,
    )
    .optional()
}

/// Find a voter of a campaign by document number
pub(crate) fn load_by_document(
    conn: &Connection,
    campaign_id: CampaignId,
    document_number: &str,
) -> rusqlite::Result<Option<Voter>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM voters WHERE campaign_id = ?1 AND document_number = ?2",
            VOTER_COLUMNS
        ),
        params![campaign_id, document_number.trim()],
        voter_from_row,
    )
    .optional()
}

/// Voter directory backed by the shared store
pub struct VoterDirectory {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
}

impl VoterDirectory {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Register a voter in `pending_review`
    pub async fn register(&self, voter: NewVoter) -> Result<VoterId> {
        let document = voter.document_number.trim();
        if document.is_empty() {
            return Err(Error::Validation("el número de documento es obligatorio".into()));
        }
        if voter.full_name.trim().is_empty() {
            return Err(Error::Validation("el nombre del votante es obligatorio".into()));
        }

        let conn = self.store.conn().await;
        let inserted = conn.execute(
            r#"
            INSERT INTO voters (campaign_id, document_number, full_name, status)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                voter.campaign_id,
                document,
                voter.full_name.trim(),
                VoterStatus::PendingReview,
            ],
        );

        match inserted {
            Ok(_) => {
                let id = VoterId(conn.last_insert_rowid());
                tracing::debug!("Registered voter {} in campaign {}", id, voter.campaign_id);
                Ok(id)
            }
            Err(e) if is_unique_violation(&e) => Err(Error::Validation(format!(
                "ya existe un votante con el documento {} en esta campaña",
                document
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Get a voter by id
    pub async fn get(&self, voter_id: VoterId) -> Result<Option<Voter>> {
        let conn = self.store.conn().await;
        Ok(load(&conn, voter_id)?)
    }

    /// Search a campaign's voters by document number
    pub async fn find_by_document(
        &self,
        campaign_id: CampaignId,
        document_number: &str,
    ) -> Result<Option<Voter>> {
        let conn = self.store.conn().await;
        Ok(load_by_document(&conn, campaign_id, document_number)?)
    }

    /// Apply a verification-pipeline transition and record it in the audit trail
    pub async fn transition(
        &self,
        voter_id: VoterId,
        next: VoterStatus,
        validated_by: UserId,
        validation_type: ValidationType,
        notes: Option<&str>,
    ) -> Result<Voter> {
        let mut conn = self.store.conn().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut voter = load(&tx, voter_id)?
            .ok_or_else(|| Error::VoterNotFound(voter_id.to_string()))?;

        if !voter.status.can_transition_to(next) {
            return Err(Error::InvalidTransition { from: voter.status, to: next });
        }

        let now = self.clock.now();
        tx.execute(
            "UPDATE voters SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![next, now, voter_id],
        )?;
        history::append(
            &tx,
            &HistoryEntry {
                voter_id,
                previous_status: Some(voter.status),
                new_status: next,
                validated_by: Some(validated_by),
                validation_type,
                notes,
                created_at: now,
            },
        )?;
        tx.commit()?;

        tracing::info!("Voter {} moved {} -> {} ({})", voter_id, voter.status, next, validation_type.as_str());
        voter.status = next;
        Ok(voter)
    }

    /// Audit trail of a voter, oldest first
    pub async fn history(&self, voter_id: VoterId) -> Result<Vec<ValidationHistory>> {
        let conn = self.store.conn().await;
        Ok(history::for_voter(&conn, voter_id)?)
    }
}

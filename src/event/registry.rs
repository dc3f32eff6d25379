//! Election Event Registry
//!
//! Lifecycle of election events: creation, activation (at most one active
//! event per campaign), deactivation, deletion and admission checks.

use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::clock::Clock;
use crate::config::ActivationPolicy;
use crate::error::{Error, Result};
use crate::event::{ElectionEvent, EventSummary, NewElectionEvent};
use crate::id::{CampaignId, EventId};
use crate::store::{is_unique_violation, Store};

/// Load an event on the caller's connection or transaction
pub(crate) fn load(conn: &Connection, event_id: EventId) -> rusqlite::Result<Option<ElectionEvent>> {
    conn.query_row(
        &format!("SELECT {} FROM election_events WHERE id = ?1", ElectionEvent::COLUMNS),
        params![event_id],
        ElectionEvent::from_row,
    )
    .optional()
}

fn vote_count(conn: &Connection, event_id: EventId) -> rusqlite::Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM vote_records WHERE election_event_id = ?1",
        params![event_id],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Registry of election events
pub struct EventRegistry {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    policy: ActivationPolicy,
}

impl EventRegistry {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>, policy: ActivationPolicy) -> Self {
        Self { store, clock, policy }
    }

    /// Create an inactive event
    pub async fn create_event(&self, new: NewElectionEvent) -> Result<EventId> {
        let date = new.validate()?;

        let conn = self.store.conn().await;
        conn.execute(
            r#"
            INSERT INTO election_events
                (campaign_id, name, event_type, simulation_number, event_date, start_time, end_time, is_active, notes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)
            "#,
            params![
                new.campaign_id,
                new.name.trim(),
                new.event_type,
                new.effective_simulation_number(),
                date,
                new.start_time,
                new.end_time,
                new.notes,
            ],
        )?;
        let id = EventId(conn.last_insert_rowid());

        tracing::info!(
            "Created {} event {} '{}' for campaign {} on {}",
            new.event_type.as_str(),
            id,
            new.name.trim(),
            new.campaign_id,
            date
        );
        Ok(id)
    }

    /// Get an event by id
    pub async fn get_event(&self, event_id: EventId) -> Result<ElectionEvent> {
        let conn = self.store.conn().await;
        load(&conn, event_id)?.ok_or(Error::EventNotFound(event_id))
    }

    /// Make `event_id` the single active event of its campaign.
    ///
    /// The event must be scheduled for today. An already active sibling is
    /// deactivated in the same transaction or the call is refused, depending
    /// on the configured policy.
    pub async fn activate_event(&self, event_id: EventId) -> Result<()> {
        let today = self.clock.today();

        let mut conn = self.store.conn().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let event = load(&tx, event_id)?.ok_or(Error::EventNotFound(event_id))?;
        if event.date != today {
            return Err(Error::NotEligibleToday { event_id, date: event.date });
        }
        if event.is_active {
            tracing::debug!("Event {} already active", event_id);
            return Ok(());
        }

        let active: Vec<EventId> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM election_events WHERE campaign_id = ?1 AND is_active = 1 AND id != ?2",
            )?;
            let rows = stmt.query_map(params![event.campaign_id, event_id], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<EventId>>>()?
        };

        if let Some(&other) = active.first() {
            match self.policy {
                ActivationPolicy::Reject => return Err(Error::AnotherEventActive(other)),
                ActivationPolicy::DeactivateOthers => {
                    tx.execute(
                        r#"
                        UPDATE election_events SET is_active = 0, updated_at = CURRENT_TIMESTAMP
                        WHERE campaign_id = ?1 AND is_active = 1 AND id != ?2
                        "#,
                        params![event.campaign_id, event_id],
                    )?;
                }
            }
        }

        let activated = tx.execute(
            "UPDATE election_events SET is_active = 1, updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
            params![event_id],
        );
        match activated {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(Error::AnotherEventActive(active.first().copied().unwrap_or(event_id)));
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit()?;

        if active.is_empty() {
            tracing::info!("Activated event {} for campaign {}", event_id, event.campaign_id);
        } else {
            tracing::info!(
                "Activated event {} for campaign {}, deactivated {:?}",
                event_id,
                event.campaign_id,
                active
            );
        }
        Ok(())
    }

    /// Deactivate an event
    pub async fn deactivate_event(&self, event_id: EventId) -> Result<()> {
        let conn = self.store.conn().await;
        let updated = conn.execute(
            "UPDATE election_events SET is_active = 0, updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
            params![event_id],
        )?;
        if updated == 0 {
            return Err(Error::EventNotFound(event_id));
        }

        tracing::info!("Deactivated event {}", event_id);
        Ok(())
    }

    /// Whether the event currently admits votes
    pub async fn is_admitting_votes(&self, event_id: EventId) -> Result<bool> {
        let event = self.get_event(event_id).await?;
        Ok(event.admits_votes_at(self.clock.local_now()))
    }

    /// The campaign's active event, if any
    pub async fn get_active_event(&self, campaign_id: CampaignId) -> Result<Option<ElectionEvent>> {
        let conn = self.store.conn().await;
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {} FROM election_events WHERE campaign_id = ?1 AND is_active = 1",
                    ElectionEvent::COLUMNS
                ),
                params![campaign_id],
                ElectionEvent::from_row,
            )
            .optional()?)
    }

    /// Delete an inactive event. Its vote records are kept.
    pub async fn delete_event(&self, event_id: EventId) -> Result<()> {
        let mut conn = self.store.conn().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let event = load(&tx, event_id)?.ok_or(Error::EventNotFound(event_id))?;
        if event.is_active {
            return Err(Error::CannotDeleteActive(event_id));
        }

        tx.execute("DELETE FROM election_events WHERE id = ?1", params![event_id])?;
        tx.commit()?;

        tracing::info!("Deleted event {} '{}'", event_id, event.name);
        Ok(())
    }

    /// Event with its vote count and admission state
    pub async fn event_summary(&self, event_id: EventId) -> Result<EventSummary> {
        let now = self.clock.local_now();
        let conn = self.store.conn().await;

        let event = load(&conn, event_id)?.ok_or(Error::EventNotFound(event_id))?;
        let vote_count = vote_count(&conn, event_id)?;
        let admitting_votes = event.admits_votes_at(now);

        Ok(EventSummary { event, vote_count, admitting_votes })
    }

    /// All events of a campaign, newest date first
    pub async fn list_events(&self, campaign_id: CampaignId) -> Result<Vec<EventSummary>> {
        let now = self.clock.local_now();
        let conn = self.store.conn().await;

        let mut stmt = conn.prepare(
            r#"
            SELECT e.id, e.campaign_id, e.name, e.event_type, e.simulation_number, e.event_date,
                   e.start_time, e.end_time, e.is_active, e.notes,
                   (SELECT COUNT(*) FROM vote_records r WHERE r.election_event_id = e.id)
            FROM election_events e
            WHERE e.campaign_id = ?1
            ORDER BY e.event_date DESC, e.id DESC
            "#,
        )?;
        let rows = stmt.query_map(params![campaign_id], |row| {
            let event = ElectionEvent::from_row(row)?;
            let vote_count: i64 = row.get(10)?;
            Ok((event, vote_count as u64))
        })?;

        let mut events = Vec::new();
        for result in rows {
            let (event, vote_count) = result?;
            let admitting_votes = event.admits_votes_at(now);
            events.push(EventSummary { event, vote_count, admitting_votes });
        }

        Ok(events)
    }
}

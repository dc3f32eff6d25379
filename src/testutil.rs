//! Shared test fixture

use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate, NaiveTime};
use rusqlite::params;

use crate::clock::{Clock, ManualClock};
use crate::config::{ActivationPolicy, FinalizationConfig};
use crate::event::{EventRegistry, EventType, NewElectionEvent};
use crate::finalize::FinalizationJob;
use crate::id::{CampaignId, EventId, VoterId};
use crate::store::Store;
use crate::vote::VoteRecorder;
use crate::voter::{VoterDirectory, VoterStatus};

/// Fixture "today" in the campaign timezone
pub const TODAY: &str = "2026-03-08";

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub struct Fixture {
    pub store: Arc<Store>,
    pub clock: Arc<ManualClock>,
    pub registry: EventRegistry,
    pub directory: VoterDirectory,
    pub recorder: VoteRecorder,
}

impl Fixture {
    /// In-memory store, clock at 10:00 on [`TODAY`] (UTC-5)
    pub fn new() -> Self {
        Self::with_policy(ActivationPolicy::DeactivateOthers)
    }

    pub fn with_policy(policy: ActivationPolicy) -> Self {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let clock = Arc::new(ManualClock::at_local(offset, date(TODAY).and_hms_opt(10, 0, 0).unwrap()));
        let dyn_clock: Arc<dyn Clock> = clock.clone();

        Self {
            registry: EventRegistry::new(Arc::clone(&store), Arc::clone(&dyn_clock), policy),
            directory: VoterDirectory::new(Arc::clone(&store), Arc::clone(&dyn_clock)),
            recorder: VoteRecorder::new(Arc::clone(&store), dyn_clock),
            store,
            clock,
        }
    }

    pub fn finalizer(&self, chunk_size: usize) -> FinalizationJob {
        let clock: Arc<dyn Clock> = self.clock.clone();
        FinalizationJob::new(Arc::clone(&self.store), clock, chunk_size)
    }

    pub fn finalization_config(&self) -> FinalizationConfig {
        FinalizationConfig {
            chunk_size: 50,
            workers: 1,
            queue_capacity: 8,
            max_attempts: 2,
            retry_backoff_ms: 1,
            status_retention_secs: 3600,
        }
    }

    /// Move the clock to `hour:minute` on [`TODAY`]
    pub fn set_time(&self, hour: u32, minute: u32) {
        self.clock.set_local(date(TODAY).and_hms_opt(hour, minute, 0).unwrap());
    }

    /// Insert a voter directly with the given status
    pub async fn voter(&self, campaign_id: CampaignId, document: &str, status: VoterStatus) -> VoterId {
        let conn = self.store.conn().await;
        conn.execute(
            "INSERT INTO voters (campaign_id, document_number, full_name, status) VALUES (?1, ?2, ?3, ?4)",
            params![campaign_id, document, format!("Votante {}", document), status],
        )
        .unwrap();
        VoterId(conn.last_insert_rowid())
    }

    /// Inactive event without a voting window
    pub async fn event(&self, campaign_id: CampaignId, day: &str) -> EventId {
        self.registry
            .create_event(new_event(campaign_id, day, None, None))
            .await
            .unwrap()
    }

    /// Inactive event with a voting window
    pub async fn windowed_event(
        &self,
        campaign_id: CampaignId,
        day: &str,
        start: (u32, u32),
        end: (u32, u32),
    ) -> EventId {
        let start = NaiveTime::from_hms_opt(start.0, start.1, 0);
        let end = NaiveTime::from_hms_opt(end.0, end.1, 0);
        self.registry
            .create_event(new_event(campaign_id, day, start, end))
            .await
            .unwrap()
    }

    /// Event scheduled today and activated
    pub async fn active_event(&self, campaign_id: CampaignId) -> EventId {
        let id = self.event(campaign_id, TODAY).await;
        self.registry.activate_event(id).await.unwrap();
        id
    }

    /// Stop admitting votes so the event can be finalized
    pub async fn close(&self, event_id: EventId) {
        self.registry.deactivate_event(event_id).await.unwrap();
    }
}

pub fn new_event(
    campaign_id: CampaignId,
    day: &str,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
) -> NewElectionEvent {
    NewElectionEvent {
        campaign_id,
        name: "Evento de prueba".into(),
        event_type: EventType::Simulation,
        date: Some(date(day)),
        start_time,
        end_time,
        simulation_number: Some(1),
        notes: None,
    }
}

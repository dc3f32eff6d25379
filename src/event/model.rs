//! Election event types

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::{CampaignId, EventId};

/// Rehearsal or the real election day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Simulation,
    Real,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Simulation => "simulation",
            EventType::Real => "real",
        }
    }
}

impl ToSql for EventType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EventType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "simulation" => Ok(EventType::Simulation),
            "real" => Ok(EventType::Real),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

/// One voting occasion scoped to a campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionEvent {
    pub id: EventId,
    pub campaign_id: CampaignId,
    pub name: String,
    pub event_type: EventType,
    pub simulation_number: Option<i64>,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub is_active: bool,
    pub notes: Option<String>,
}

impl ElectionEvent {
    pub(crate) const COLUMNS: &'static str =
        "id, campaign_id, name, event_type, simulation_number, event_date, start_time, end_time, is_active, notes";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            campaign_id: row.get(1)?,
            name: row.get(2)?,
            event_type: row.get(3)?,
            simulation_number: row.get(4)?,
            date: row.get(5)?,
            start_time: row.get(6)?,
            end_time: row.get(7)?,
            is_active: row.get(8)?,
            notes: row.get(9)?,
        })
    }

    /// Whether the event admits votes at the given local wall-clock time.
    ///
    /// Requires the event to be active, scheduled for that calendar day and,
    /// when configured, `now` inside `[start_time, end_time]`.
    pub fn admits_votes_at(&self, now: NaiveDateTime) -> bool {
        if !self.is_active || now.date() != self.date {
            return false;
        }

        let time = now.time();
        if let Some(start) = self.start_time {
            if time < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if time > end {
                return false;
            }
        }

        true
    }
}

/// Input for creating an event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewElectionEvent {
    pub campaign_id: CampaignId,
    pub name: String,
    pub event_type: EventType,
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    #[serde(default)]
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub simulation_number: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewElectionEvent {
    /// Check the input, returning the event date
    pub fn validate(&self) -> Result<NaiveDate> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("el nombre del evento es obligatorio".into()));
        }

        let date = self
            .date
            .ok_or_else(|| Error::Validation("la fecha del evento es obligatoria".into()))?;

        if self.event_type == EventType::Simulation {
            if let Some(number) = self.simulation_number {
                if number <= 0 {
                    return Err(Error::Validation(
                        "el número de simulacro debe ser mayor que cero".into(),
                    ));
                }
            }
        }

        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start > end {
                return Err(Error::Validation(
                    "la hora de inicio debe ser anterior a la hora de cierre".into(),
                ));
            }
        }

        Ok(date)
    }

    /// Simulation number as stored; only simulations keep one
    pub fn effective_simulation_number(&self) -> Option<i64> {
        match self.event_type {
            EventType::Simulation => self.simulation_number,
            EventType::Real => None,
        }
    }
}

/// Event plus derived read-side figures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSummary {
    #[serde(flatten)]
    pub event: ElectionEvent,
    pub vote_count: u64,
    pub admitting_votes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(start: Option<(u32, u32)>, end: Option<(u32, u32)>) -> ElectionEvent {
        ElectionEvent {
            id: EventId(1),
            campaign_id: CampaignId(1),
            name: "Día D".into(),
            event_type: EventType::Real,
            simulation_number: None,
            date: NaiveDate::from_ymd_opt(2026, 3, 8).unwrap(),
            start_time: start.map(|(h, m)| NaiveTime::from_hms_opt(h, m, 0).unwrap()),
            end_time: end.map(|(h, m)| NaiveTime::from_hms_opt(h, m, 0).unwrap()),
            is_active: true,
            notes: None,
        }
    }

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_window_bounds_inclusive() {
        let e = event(Some((8, 0)), Some((18, 0)));
        assert!(!e.admits_votes_at(at(8, 7, 59)));
        assert!(e.admits_votes_at(at(8, 8, 0)));
        assert!(e.admits_votes_at(at(8, 12, 30)));
        assert!(e.admits_votes_at(at(8, 18, 0)));
        assert!(!e.admits_votes_at(at(8, 19, 0)));
    }

    #[test]
    fn test_no_window_means_whole_day() {
        let e = event(None, None);
        assert!(e.admits_votes_at(at(8, 0, 0)));
        assert!(e.admits_votes_at(at(8, 23, 59)));
        assert!(!e.admits_votes_at(at(9, 0, 0)));
        assert!(!e.admits_votes_at(at(7, 23, 59)));
    }

    #[test]
    fn test_open_ended_window() {
        let e = event(Some((14, 0)), None);
        assert!(!e.admits_votes_at(at(8, 13, 0)));
        assert!(e.admits_votes_at(at(8, 23, 0)));
    }

    #[test]
    fn test_inactive_never_admits() {
        let mut e = event(None, None);
        e.is_active = false;
        assert!(!e.admits_votes_at(at(8, 12, 0)));
    }

    fn new_event(event_type: EventType, simulation_number: Option<i64>) -> NewElectionEvent {
        NewElectionEvent {
            campaign_id: CampaignId(1),
            name: "Simulacro 1".into(),
            event_type,
            date: NaiveDate::from_ymd_opt(2026, 3, 1),
            start_time: None,
            end_time: None,
            simulation_number,
            notes: None,
        }
    }

    #[test]
    fn test_validate() {
        assert!(new_event(EventType::Simulation, Some(1)).validate().is_ok());
        assert!(new_event(EventType::Simulation, None).validate().is_ok());
        assert!(new_event(EventType::Simulation, Some(0)).validate().is_err());
        assert!(new_event(EventType::Simulation, Some(-2)).validate().is_err());

        let mut missing_date = new_event(EventType::Real, None);
        missing_date.date = None;
        assert!(matches!(missing_date.validate(), Err(Error::Validation(_))));

        let mut crossed = new_event(EventType::Real, None);
        crossed.start_time = NaiveTime::from_hms_opt(20, 0, 0);
        crossed.end_time = NaiveTime::from_hms_opt(6, 0, 0);
        assert!(crossed.validate().is_err());
    }

    #[test]
    fn test_real_event_drops_simulation_number() {
        assert_eq!(new_event(EventType::Real, Some(3)).effective_simulation_number(), None);
        assert_eq!(new_event(EventType::Simulation, Some(3)).effective_simulation_number(), Some(3));
    }
}

//! Diad Error Types

use thiserror::Error;

use crate::id::{EventId, VoterId};
use crate::voter::VoterStatus;

/// Result type alias for Diad operations
pub type Result<T> = std::result::Result<T, Error>;

/// Diad error types
#[derive(Error, Debug)]
pub enum Error {
    // Business rule violations
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Event {event_id} is scheduled for {date}, not today")]
    NotEligibleToday { event_id: EventId, date: chrono::NaiveDate },

    #[error("Another event is already active for this campaign: {0}")]
    AnotherEventActive(EventId),

    #[error("Election event not found: {0}")]
    EventNotFound(EventId),

    #[error("Election event {0} is not admitting votes")]
    EventNotAdmittingVotes(EventId),

    #[error("Voter {voter_id} already voted in event {event_id}")]
    DuplicateVote { voter_id: VoterId, event_id: EventId },

    #[error("Cannot delete active election event {0}")]
    CannotDeleteActive(EventId),

    #[error("Election event {0} is still active and cannot be finalized")]
    EventStillActive(EventId),

    #[error("Voter not found: {0}")]
    VoterNotFound(String),

    #[error("Voter {voter_id} does not belong to the campaign of event {event_id}")]
    VoterNotInCampaign { voter_id: VoterId, event_id: EventId },

    #[error("Status transition not allowed: {from} -> {to}")]
    InvalidTransition { from: VoterStatus, to: VoterStatus },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Job errors
    #[error("Finalization of event {event_id} left {failed} voters unprocessed")]
    PartialFinalization { event_id: EventId, failed: u64 },

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl Error {
    /// Expected business-rule violations, presentable to the end user
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::NotEligibleToday { .. }
                | Error::AnotherEventActive(_)
                | Error::EventNotFound(_)
                | Error::EventNotAdmittingVotes(_)
                | Error::DuplicateVote { .. }
                | Error::CannotDeleteActive(_)
                | Error::EventStillActive(_)
                | Error::VoterNotFound(_)
                | Error::VoterNotInCampaign { .. }
                | Error::InvalidTransition { .. }
        )
    }

    /// Check if this error is retryable by the job queue
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Storage(_) | Error::Io(_) | Error::PartialFinalization { .. }
        )
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotEligibleToday { .. } => "NOT_ELIGIBLE_TODAY",
            Error::AnotherEventActive(_) => "ANOTHER_EVENT_ACTIVE",
            Error::EventNotFound(_) => "EVENT_NOT_FOUND",
            Error::EventNotAdmittingVotes(_) => "EVENT_NOT_ADMITTING_VOTES",
            Error::DuplicateVote { .. } => "DUPLICATE_VOTE",
            Error::CannotDeleteActive(_) => "CANNOT_DELETE_ACTIVE",
            Error::EventStillActive(_) => "EVENT_STILL_ACTIVE",
            Error::VoterNotFound(_) => "VOTER_NOT_FOUND",
            Error::VoterNotInCampaign { .. } => "VOTER_NOT_IN_CAMPAIGN",
            Error::InvalidTransition { .. } => "INVALID_TRANSITION",
            Error::ShuttingDown => "SHUTTING_DOWN",
            _ => "INTERNAL_ERROR",
        }
    }

    /// User-facing message, one per error kind
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation(detail) => format!("Datos inválidos: {}", detail),
            Error::NotEligibleToday { .. } => {
                "Solo se puede activar un evento programado para el día de hoy".to_string()
            }
            Error::AnotherEventActive(_) => {
                "Ya existe otro evento electoral activo para esta campaña".to_string()
            }
            Error::EventNotFound(_) => "El evento electoral no existe".to_string(),
            Error::EventNotAdmittingVotes(_) => {
                "No hay ningún evento electoral activo en este momento".to_string()
            }
            Error::DuplicateVote { .. } => "Este votante ya tiene un registro de voto".to_string(),
            Error::CannotDeleteActive(_) => {
                "No se puede eliminar un evento electoral activo".to_string()
            }
            Error::EventStillActive(_) => {
                "No se puede finalizar un evento electoral activo. Desactívelo primero".to_string()
            }
            Error::VoterNotFound(_) => "No se encontró el votante".to_string(),
            Error::VoterNotInCampaign { .. } => {
                "El votante no pertenece a la campaña de este evento".to_string()
            }
            Error::InvalidTransition { .. } => {
                "El cambio de estado del votante no está permitido".to_string()
            }
            Error::ShuttingDown => {
                "El servicio se está deteniendo. Intente de nuevo en unos minutos".to_string()
            }
            _ => "Error interno del sistema. Intente de nuevo más tarde".to_string(),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(format!("SQLite error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn business_errors() -> Vec<Error> {
        vec![
            Error::Validation("la fecha es obligatoria".into()),
            Error::NotEligibleToday {
                event_id: EventId(1),
                date: chrono::NaiveDate::from_ymd_opt(2026, 3, 8).unwrap(),
            },
            Error::AnotherEventActive(EventId(2)),
            Error::EventNotFound(EventId(3)),
            Error::EventNotAdmittingVotes(EventId(4)),
            Error::DuplicateVote { voter_id: VoterId(1), event_id: EventId(4) },
            Error::CannotDeleteActive(EventId(5)),
            Error::EventStillActive(EventId(6)),
            Error::VoterNotFound("123".into()),
            Error::VoterNotInCampaign { voter_id: VoterId(1), event_id: EventId(4) },
            Error::InvalidTransition { from: VoterStatus::Confirmed, to: VoterStatus::PendingReview },
        ]
    }

    #[test]
    fn test_business_messages_are_distinct() {
        let errors = business_errors();
        let messages: HashSet<String> = errors.iter().map(|e| e.user_message()).collect();
        let codes: HashSet<&str> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(messages.len(), errors.len());
        assert_eq!(codes.len(), errors.len());
        assert!(errors.iter().all(|e| e.is_business() && !e.is_retryable()));
    }

    #[test]
    fn test_known_messages() {
        assert_eq!(
            Error::EventNotAdmittingVotes(EventId(1)).user_message(),
            "No hay ningún evento electoral activo en este momento"
        );
        assert_eq!(
            Error::DuplicateVote { voter_id: VoterId(1), event_id: EventId(1) }.user_message(),
            "Este votante ya tiene un registro de voto"
        );
    }

    #[test]
    fn test_technical_errors() {
        let err = Error::Storage("database is locked".into());
        assert!(!err.is_business());
        assert!(err.is_retryable());
        assert_eq!(err.code(), "INTERNAL_ERROR");

        let err = Error::PartialFinalization { event_id: EventId(1), failed: 3 };
        assert!(err.is_retryable());
        assert!(!Error::ShuttingDown.is_retryable());
    }
}

//! Validation History
//!
//! Append-only audit trail of voter status transitions. The table rejects
//! updates and deletes at the storage layer.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::id::{UserId, VoterId};
use crate::voter::VoterStatus;

/// Which process produced a status transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationType {
    Census,
    Call,
    Survey,
    Election,
}

impl ValidationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationType::Census => "census",
            ValidationType::Call => "call",
            ValidationType::Survey => "survey",
            ValidationType::Election => "election",
        }
    }
}

impl std::str::FromStr for ValidationType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "census" => Ok(ValidationType::Census),
            "call" => Ok(ValidationType::Call),
            "survey" => Ok(ValidationType::Survey),
            "election" => Ok(ValidationType::Election),
            other => Err(crate::Error::Validation(format!(
                "tipo de validación desconocido: {}",
                other
            ))),
        }
    }
}

impl ToSql for ValidationType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ValidationType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// One recorded status transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationHistory {
    pub id: i64,
    pub voter_id: VoterId,
    pub previous_status: Option<VoterStatus>,
    pub new_status: VoterStatus,
    pub validated_by: Option<UserId>,
    pub validation_type: ValidationType,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Entry to append
#[derive(Debug, Clone)]
pub struct HistoryEntry<'a> {
    pub voter_id: VoterId,
    pub previous_status: Option<VoterStatus>,
    pub new_status: VoterStatus,
    pub validated_by: Option<UserId>,
    pub validation_type: ValidationType,
    pub notes: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

/// Append an entry on the caller's connection or transaction
pub(crate) fn append(conn: &Connection, entry: &HistoryEntry<'_>) -> rusqlite::Result<i64> {
    conn.execute(
        r#"
        INSERT INTO validation_history
            (voter_id, previous_status, new_status, validated_by, validation_type, notes, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            entry.voter_id,
            entry.previous_status,
            entry.new_status,
            entry.validated_by,
            entry.validation_type,
            entry.notes,
            entry.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// All entries for a voter, oldest first
pub(crate) fn for_voter(conn: &Connection, voter_id: VoterId) -> rusqlite::Result<Vec<ValidationHistory>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, voter_id, previous_status, new_status, validated_by, validation_type, notes, created_at
        FROM validation_history
        WHERE voter_id = ?1
        ORDER BY id
        "#,
    )?;
    let rows = stmt.query_map(params![voter_id], |row| {
        Ok(ValidationHistory {
            id: row.get(0)?,
            voter_id: row.get(1)?,
            previous_status: row.get(2)?,
            new_status: row.get(3)?,
            validated_by: row.get(4)?,
            validation_type: row.get(5)?,
            notes: row.get(6)?,
            created_at: row.get(7)?,
        })
    })?;

    let mut entries = Vec::new();
    for result in rows {
        entries.push(result?);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn test_append_and_list() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn().await;
        let at = Utc::now();

        append(
            &conn,
            &HistoryEntry {
                voter_id: VoterId(1),
                previous_status: Some(VoterStatus::PendingReview),
                new_status: VoterStatus::VerifiedCensus,
                validated_by: Some(UserId(9)),
                validation_type: ValidationType::Census,
                notes: None,
                created_at: at,
            },
        )
        .unwrap();
        append(
            &conn,
            &HistoryEntry {
                voter_id: VoterId(1),
                previous_status: Some(VoterStatus::Confirmed),
                new_status: VoterStatus::DidNotVote,
                validated_by: Some(UserId(9)),
                validation_type: ValidationType::Election,
                notes: Some("cierre"),
                created_at: at,
            },
        )
        .unwrap();

        let entries = for_voter(&conn, VoterId(1)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].validation_type, ValidationType::Census);
        assert_eq!(entries[1].new_status, VoterStatus::DidNotVote);
        assert_eq!(entries[1].notes.as_deref(), Some("cierre"));
        assert!(for_voter(&conn, VoterId(2)).unwrap().is_empty());
    }
}

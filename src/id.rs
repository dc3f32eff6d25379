//! Typed Identifiers
//!
//! Row identifiers are SQLite integer keys. Each entity gets its own
//! newtype so a voter id can never be passed where an event id is expected.

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Get the raw i64 value
            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map(Self)
            }
        }
    };
}

row_id!(
    /// Campaign that scopes voters and election events
    CampaignId
);
row_id!(
    /// Voter tracked through the verification pipeline
    VoterId
);
row_id!(
    /// Election event (simulation or real election day)
    EventId
);
row_id!(
    /// Acting user, recorded as `validated_by` in the audit trail
    UserId
);
row_id!(
    /// Immutable vote record
    VoteRecordId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_transparent() {
        let id = EventId(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        let back: VoterId = serde_json::from_str("7").unwrap();
        assert_eq!(back, VoterId(7));
        assert_eq!(back.to_string(), "7");
    }

    #[test]
    fn test_sqlite_roundtrip() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let id: CampaignId = conn
            .query_row("SELECT ?1", [CampaignId(99)], |row| row.get(0))
            .unwrap();
        assert_eq!(id.as_i64(), 99);
    }
}

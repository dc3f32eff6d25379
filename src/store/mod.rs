//! Store
//!
//! Persistent storage for events, votes, voters and the audit trail,
//! backed by SQLite.

mod schema;

use std::path::Path;

use rusqlite::Connection;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::Result;

/// SQLite-backed store shared by every component
pub struct Store {
    /// Database connection
    conn: Mutex<Connection>,
}

impl Store {
    /// Create or open the store inside `data_dir`
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join("diad.db");
        let conn = Connection::open(&db_path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!("Opened store at {:?} (journal_mode={})", db_path, mode);

        Self::init(conn)
    }

    /// Open a private in-memory store
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(schema::SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection
    ///
    /// The guard serializes writers; callers open their own transactions.
    pub async fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

/// Check whether a storage error is a UNIQUE constraint violation
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_store_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = Store::open(dir.path()).unwrap();
            let conn = store.conn().await;
            conn.execute(
                "INSERT INTO voters (campaign_id, document_number, full_name) VALUES (1, '100', 'Ana')",
                [],
            )
            .unwrap();
        }

        let store = Store::open(dir.path()).unwrap();
        let conn = store.conn().await;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM voters", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_vote_pair_is_unique() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn().await;
        let insert = "INSERT INTO vote_records (voter_id, campaign_id, election_event_id, voted_at)
                      VALUES (1, 1, ?1, '2026-03-08T10:00:00Z')";

        conn.execute(insert, [1]).unwrap();
        conn.execute(insert, [2]).unwrap();
        let err = conn.execute(insert, [1]).unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_single_active_event_index() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn().await;
        let insert = "INSERT INTO election_events (campaign_id, name, event_type, event_date, is_active)
                      VALUES (?1, 'e', 'real', '2026-03-08', 1)";

        conn.execute(insert, [1]).unwrap();
        conn.execute(insert, [2]).unwrap();
        let err = conn.execute(insert, [1]).unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_history_is_append_only() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn().await;
        conn.execute(
            "INSERT INTO validation_history (voter_id, new_status, validation_type, created_at)
             VALUES (1, 'confirmed', 'survey', '2026-03-08T10:00:00Z')",
            [],
        )
        .unwrap();

        assert!(conn.execute("UPDATE validation_history SET notes = 'x'", []).is_err());
        assert!(conn.execute("DELETE FROM validation_history", []).is_err());
    }
}

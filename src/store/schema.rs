//! SQLite schema
//!
//! Invariants the application relies on are enforced here, not only in code:
//! one active event per campaign, one vote per voter per event, and an
//! append-only audit trail.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS voters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    campaign_id INTEGER NOT NULL,
    document_number TEXT NOT NULL,
    full_name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending_review',
    voted_at TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (campaign_id, document_number)
);

CREATE INDEX IF NOT EXISTS idx_voters_campaign_status
    ON voters(campaign_id, status);

CREATE TABLE IF NOT EXISTS election_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    campaign_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    event_type TEXT NOT NULL CHECK (event_type IN ('simulation', 'real')),
    simulation_number INTEGER,
    event_date TEXT NOT NULL,
    start_time TEXT,
    end_time TEXT,
    is_active INTEGER NOT NULL DEFAULT 0,
    notes TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_election_events_single_active
    ON election_events(campaign_id) WHERE is_active = 1;

CREATE TABLE IF NOT EXISTS vote_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    voter_id INTEGER NOT NULL,
    campaign_id INTEGER NOT NULL,
    election_event_id INTEGER NOT NULL,
    voted_at TEXT NOT NULL,
    UNIQUE (voter_id, election_event_id)
);

CREATE INDEX IF NOT EXISTS idx_vote_records_event
    ON vote_records(election_event_id);

CREATE TRIGGER IF NOT EXISTS vote_records_immutable
    BEFORE UPDATE ON vote_records
BEGIN
    SELECT RAISE(ABORT, 'vote_records rows are immutable');
END;

CREATE TABLE IF NOT EXISTS validation_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    voter_id INTEGER NOT NULL,
    previous_status TEXT,
    new_status TEXT NOT NULL,
    validated_by INTEGER,
    validation_type TEXT NOT NULL,
    notes TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_validation_history_voter
    ON validation_history(voter_id);

CREATE TRIGGER IF NOT EXISTS validation_history_no_update
    BEFORE UPDATE ON validation_history
BEGIN
    SELECT RAISE(ABORT, 'validation_history is append-only');
END;

CREATE TRIGGER IF NOT EXISTS validation_history_no_delete
    BEFORE DELETE ON validation_history
BEGIN
    SELECT RAISE(ABORT, 'validation_history is append-only');
END;
"#;

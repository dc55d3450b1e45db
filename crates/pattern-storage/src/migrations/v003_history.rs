//! History ledger tables. No foreign key to `patterns`: the audit trail
//! outlives the pattern it describes.

pub const MIGRATION_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS pattern_histories (
    pattern_id TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    created_at TEXT NOT NULL,
    last_modified TEXT NOT NULL
) STRICT;

CREATE TABLE IF NOT EXISTS pattern_history_events (
    id TEXT PRIMARY KEY,
    pattern_id TEXT NOT NULL REFERENCES pattern_histories(pattern_id) ON DELETE CASCADE,
    seq INTEGER NOT NULL,
    timestamp TEXT NOT NULL,
    event_type TEXT NOT NULL CHECK (event_type IN (
        'created', 'updated', 'approved', 'ignored', 'deleted',
        'confidence_changed', 'locations_changed', 'severity_changed')),
    user TEXT,
    previous_value TEXT,
    new_value TEXT,
    details TEXT
) STRICT;

CREATE INDEX IF NOT EXISTS idx_history_events_pattern ON pattern_history_events(pattern_id, seq);
CREATE INDEX IF NOT EXISTS idx_history_events_timestamp ON pattern_history_events(timestamp);
"#;

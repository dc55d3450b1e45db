//! Append-only change log fed by triggers on the primary entity tables.
//!
//! The patterns update trigger lists every column except the two counters,
//! so counter maintenance does not produce extra change rows.

pub const MIGRATION_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS change_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name TEXT NOT NULL,
    row_id TEXT NOT NULL,
    operation TEXT NOT NULL CHECK (operation IN ('insert', 'update', 'delete')),
    changed_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    synced INTEGER NOT NULL DEFAULT 0 CHECK (synced IN (0, 1))
) STRICT;

CREATE INDEX IF NOT EXISTS idx_change_log_unsynced ON change_log(synced, id);

CREATE TRIGGER IF NOT EXISTS trg_patterns_cdc_insert
AFTER INSERT ON patterns
BEGIN
    INSERT INTO change_log (table_name, row_id, operation) VALUES ('patterns', NEW.id, 'insert');
END;

CREATE TRIGGER IF NOT EXISTS trg_patterns_cdc_update
AFTER UPDATE OF category, subcategory, name, description, detector_type, detector_config,
    confidence_frequency, confidence_consistency, confidence_age, confidence_spread,
    confidence_score, confidence_level, severity, auto_fixable, status, first_seen,
    last_seen, approved_at, approved_by, tags, source, extra ON patterns
BEGIN
    INSERT INTO change_log (table_name, row_id, operation) VALUES ('patterns', NEW.id, 'update');
END;

CREATE TRIGGER IF NOT EXISTS trg_patterns_cdc_delete
AFTER DELETE ON patterns
BEGIN
    INSERT INTO change_log (table_name, row_id, operation) VALUES ('patterns', OLD.id, 'delete');
END;

CREATE TRIGGER IF NOT EXISTS trg_pattern_locations_cdc_insert
AFTER INSERT ON pattern_locations
BEGIN
    INSERT INTO change_log (table_name, row_id, operation)
    VALUES ('pattern_locations', NEW.pattern_id || ':' || NEW.file || ':' || NEW.line || ':' || NEW.column_num, 'insert');
END;

CREATE TRIGGER IF NOT EXISTS trg_pattern_locations_cdc_update
AFTER UPDATE ON pattern_locations
BEGIN
    INSERT INTO change_log (table_name, row_id, operation)
    VALUES ('pattern_locations', NEW.pattern_id || ':' || NEW.file || ':' || NEW.line || ':' || NEW.column_num, 'update');
END;

CREATE TRIGGER IF NOT EXISTS trg_pattern_locations_cdc_delete
AFTER DELETE ON pattern_locations
BEGIN
    INSERT INTO change_log (table_name, row_id, operation)
    VALUES ('pattern_locations', OLD.pattern_id || ':' || OLD.file || ':' || OLD.line || ':' || OLD.column_num, 'delete');
END;
"#;

//! Dated snapshots and persisted severity configuration.

pub const MIGRATION_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    snapshot_date TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    summary TEXT NOT NULL,
    patterns TEXT NOT NULL
) STRICT;

CREATE TABLE IF NOT EXISTS severity_settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    default_severity TEXT NOT NULL CHECK (default_severity IN ('error', 'warning', 'info', 'hint')),
    escalation_enabled INTEGER NOT NULL DEFAULT 0 CHECK (escalation_enabled IN (0, 1)),
    escalation_threshold INTEGER NOT NULL CHECK (escalation_threshold > 0)
) STRICT;

CREATE TABLE IF NOT EXISTS severity_overrides (
    scope TEXT NOT NULL CHECK (scope IN ('pattern', 'category', 'category_default')),
    target TEXT NOT NULL,
    severity TEXT NOT NULL CHECK (severity IN ('error', 'warning', 'info', 'hint')),
    PRIMARY KEY (scope, target)
) STRICT;

CREATE TABLE IF NOT EXISTS escalation_rules (
    position INTEGER PRIMARY KEY,
    from_severity TEXT NOT NULL CHECK (from_severity IN ('warning', 'info', 'hint')),
    to_severity TEXT NOT NULL CHECK (to_severity IN ('error', 'warning', 'info')),
    after_count INTEGER CHECK (after_count IS NULL OR after_count > 0)
) STRICT;

CREATE TRIGGER IF NOT EXISTS trg_snapshots_cdc_insert
AFTER INSERT ON snapshots
BEGIN
    INSERT INTO change_log (table_name, row_id, operation) VALUES ('snapshots', NEW.snapshot_date, 'insert');
END;

CREATE TRIGGER IF NOT EXISTS trg_snapshots_cdc_update
AFTER UPDATE ON snapshots
BEGIN
    INSERT INTO change_log (table_name, row_id, operation) VALUES ('snapshots', NEW.snapshot_date, 'update');
END;

CREATE TRIGGER IF NOT EXISTS trg_snapshots_cdc_delete
AFTER DELETE ON snapshots
BEGIN
    INSERT INTO change_log (table_name, row_id, operation) VALUES ('snapshots', OLD.snapshot_date, 'delete');
END;

CREATE TRIGGER IF NOT EXISTS trg_severity_overrides_cdc_insert
AFTER INSERT ON severity_overrides
BEGIN
    INSERT INTO change_log (table_name, row_id, operation) VALUES ('severity_overrides', NEW.scope || ':' || NEW.target, 'insert');
END;

CREATE TRIGGER IF NOT EXISTS trg_severity_overrides_cdc_delete
AFTER DELETE ON severity_overrides
BEGIN
    INSERT INTO change_log (table_name, row_id, operation) VALUES ('severity_overrides', OLD.scope || ':' || OLD.target, 'delete');
END;

CREATE TRIGGER IF NOT EXISTS trg_escalation_rules_cdc_insert
AFTER INSERT ON escalation_rules
BEGIN
    INSERT INTO change_log (table_name, row_id, operation) VALUES ('escalation_rules', CAST(NEW.position AS TEXT), 'insert');
END;

CREATE TRIGGER IF NOT EXISTS trg_escalation_rules_cdc_delete
AFTER DELETE ON escalation_rules
BEGIN
    INSERT INTO change_log (table_name, row_id, operation) VALUES ('escalation_rules', CAST(OLD.position AS TEXT), 'delete');
END;
"#;

//! API contracts and sensitive-field declarations.

pub const MIGRATION_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS contracts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    method TEXT NOT NULL CHECK (method IN ('GET', 'POST', 'PUT', 'PATCH', 'DELETE', 'HEAD', 'OPTIONS')),
    endpoint TEXT NOT NULL,
    normalized_endpoint TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'discovered' CHECK (status IN ('discovered', 'verified', 'mismatch', 'ignored')),
    confidence REAL NOT NULL DEFAULT 0 CHECK (confidence >= 0.0 AND confidence <= 1.0),
    backend_file TEXT,
    frontend_file TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    UNIQUE (method, normalized_endpoint)
) STRICT;

CREATE TABLE IF NOT EXISTS sensitive_fields (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name TEXT NOT NULL,
    field_name TEXT NOT NULL,
    sensitivity TEXT NOT NULL CHECK (sensitivity IN ('pii', 'credentials', 'financial', 'health')),
    reason TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    UNIQUE (table_name, field_name)
) STRICT;

CREATE TRIGGER IF NOT EXISTS trg_contracts_cdc_insert
AFTER INSERT ON contracts
BEGIN
    INSERT INTO change_log (table_name, row_id, operation) VALUES ('contracts', CAST(NEW.id AS TEXT), 'insert');
END;

CREATE TRIGGER IF NOT EXISTS trg_contracts_cdc_update
AFTER UPDATE ON contracts
BEGIN
    INSERT INTO change_log (table_name, row_id, operation) VALUES ('contracts', CAST(NEW.id AS TEXT), 'update');
END;

CREATE TRIGGER IF NOT EXISTS trg_contracts_cdc_delete
AFTER DELETE ON contracts
BEGIN
    INSERT INTO change_log (table_name, row_id, operation) VALUES ('contracts', CAST(OLD.id AS TEXT), 'delete');
END;

CREATE TRIGGER IF NOT EXISTS trg_sensitive_fields_cdc_insert
AFTER INSERT ON sensitive_fields
BEGIN
    INSERT INTO change_log (table_name, row_id, operation) VALUES ('sensitive_fields', NEW.table_name || '.' || NEW.field_name, 'insert');
END;

CREATE TRIGGER IF NOT EXISTS trg_sensitive_fields_cdc_update
AFTER UPDATE ON sensitive_fields
BEGIN
    INSERT INTO change_log (table_name, row_id, operation) VALUES ('sensitive_fields', NEW.table_name || '.' || NEW.field_name, 'update');
END;

CREATE TRIGGER IF NOT EXISTS trg_sensitive_fields_cdc_delete
AFTER DELETE ON sensitive_fields
BEGIN
    INSERT INTO change_log (table_name, row_id, operation) VALUES ('sensitive_fields', OLD.table_name || '.' || OLD.field_name, 'delete');
END;
"#;

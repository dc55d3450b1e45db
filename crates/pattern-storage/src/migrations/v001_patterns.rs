//! Patterns and their locations, with counter-maintaining triggers.

pub const MIGRATION_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS patterns (
    id TEXT PRIMARY KEY,
    category TEXT NOT NULL CHECK (category IN (
        'api', 'auth', 'security', 'errors', 'logging', 'data-access', 'config',
        'testing', 'performance', 'components', 'styling', 'structural', 'types',
        'accessibility', 'documentation')),
    subcategory TEXT NOT NULL DEFAULT '',
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    detector_type TEXT NOT NULL CHECK (detector_type IN ('regex', 'ast', 'semantic', 'structural', 'custom')),
    detector_config TEXT NOT NULL DEFAULT '{}',
    confidence_frequency REAL NOT NULL DEFAULT 0,
    confidence_consistency REAL NOT NULL DEFAULT 0,
    confidence_age REAL NOT NULL DEFAULT 0,
    confidence_spread REAL NOT NULL DEFAULT 0,
    confidence_score REAL NOT NULL CHECK (confidence_score >= 0.0 AND confidence_score <= 1.0),
    confidence_level TEXT NOT NULL CHECK (confidence_level IN ('high', 'medium', 'low', 'uncertain')),
    severity TEXT NOT NULL CHECK (severity IN ('error', 'warning', 'info', 'hint')),
    auto_fixable INTEGER NOT NULL DEFAULT 0 CHECK (auto_fixable IN (0, 1)),
    status TEXT NOT NULL DEFAULT 'discovered' CHECK (status IN ('discovered', 'approved', 'ignored')),
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL,
    approved_at TEXT,
    approved_by TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    source TEXT,
    extra TEXT,
    location_count INTEGER NOT NULL DEFAULT 0,
    outlier_count INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
) STRICT;

CREATE INDEX IF NOT EXISTS idx_patterns_category ON patterns(category);
CREATE INDEX IF NOT EXISTS idx_patterns_status ON patterns(status);
CREATE INDEX IF NOT EXISTS idx_patterns_severity ON patterns(severity);

CREATE TABLE IF NOT EXISTS pattern_locations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern_id TEXT NOT NULL REFERENCES patterns(id) ON DELETE CASCADE,
    file TEXT NOT NULL,
    line INTEGER NOT NULL CHECK (line >= 0),
    column_num INTEGER NOT NULL CHECK (column_num >= 0),
    end_line INTEGER,
    end_column INTEGER,
    is_outlier INTEGER NOT NULL DEFAULT 0 CHECK (is_outlier IN (0, 1)),
    deviation_score REAL,
    outlier_reason TEXT,
    confidence REAL CHECK (confidence IS NULL OR (confidence >= 0.0 AND confidence <= 1.0)),
    snippet TEXT,
    position INTEGER NOT NULL DEFAULT 0,
    UNIQUE (pattern_id, file, line, column_num)
) STRICT;

CREATE INDEX IF NOT EXISTS idx_pattern_locations_file ON pattern_locations(file);

CREATE TRIGGER IF NOT EXISTS trg_pattern_locations_count_insert
AFTER INSERT ON pattern_locations
BEGIN
    UPDATE patterns SET
        location_count = (SELECT COUNT(*) FROM pattern_locations WHERE pattern_id = NEW.pattern_id AND is_outlier = 0),
        outlier_count = (SELECT COUNT(*) FROM pattern_locations WHERE pattern_id = NEW.pattern_id AND is_outlier = 1)
    WHERE id = NEW.pattern_id;
END;

CREATE TRIGGER IF NOT EXISTS trg_pattern_locations_count_delete
AFTER DELETE ON pattern_locations
BEGIN
    UPDATE patterns SET
        location_count = (SELECT COUNT(*) FROM pattern_locations WHERE pattern_id = OLD.pattern_id AND is_outlier = 0),
        outlier_count = (SELECT COUNT(*) FROM pattern_locations WHERE pattern_id = OLD.pattern_id AND is_outlier = 1)
    WHERE id = OLD.pattern_id;
END;

CREATE TRIGGER IF NOT EXISTS trg_pattern_locations_count_update
AFTER UPDATE OF is_outlier, pattern_id ON pattern_locations
BEGIN
    UPDATE patterns SET
        location_count = (SELECT COUNT(*) FROM pattern_locations WHERE pattern_id = NEW.pattern_id AND is_outlier = 0),
        outlier_count = (SELECT COUNT(*) FROM pattern_locations WHERE pattern_id = NEW.pattern_id AND is_outlier = 1)
    WHERE id = NEW.pattern_id;
END;
"#;

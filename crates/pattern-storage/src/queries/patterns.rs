//! Pattern row queries. Locations are handled in `locations`.

use pattern_core::errors::StorageError;
use pattern_core::types::{
    ConfidenceInfo, DetectorDescriptor, Pattern, PatternMetadata,
};
use rusqlite::{params, Connection, OptionalExtension};

use super::util::{
    from_json, opt_ts_from_sql, parse_enum, sqlite_err, to_json, ts_from_sql, ts_to_sql,
};

const PATTERN_COLUMNS: &str = "id, category, subcategory, name, description, detector_type, detector_config,
    confidence_frequency, confidence_consistency, confidence_age, confidence_spread,
    confidence_score, confidence_level, severity, auto_fixable, status, first_seen, last_seen,
    approved_at, approved_by, tags, source, extra, location_count, outlier_count";

/// A raw `patterns` row before enum and JSON decoding.
#[derive(Debug, Clone)]
struct PatternRow {
    id: String,
    category: String,
    subcategory: String,
    name: String,
    description: String,
    detector_type: String,
    detector_config: String,
    frequency: f64,
    consistency: f64,
    age: f64,
    spread: f64,
    score: f64,
    level: String,
    severity: String,
    auto_fixable: bool,
    status: String,
    first_seen: String,
    last_seen: String,
    approved_at: Option<String>,
    approved_by: Option<String>,
    tags: String,
    source: Option<String>,
    extra: Option<String>,
    location_count: u32,
    outlier_count: u32,
}

fn map_pattern_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PatternRow> {
    Ok(PatternRow {
        id: row.get(0)?,
        category: row.get(1)?,
        subcategory: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        detector_type: row.get(5)?,
        detector_config: row.get(6)?,
        frequency: row.get(7)?,
        consistency: row.get(8)?,
        age: row.get(9)?,
        spread: row.get(10)?,
        score: row.get(11)?,
        level: row.get(12)?,
        severity: row.get(13)?,
        auto_fixable: row.get(14)?,
        status: row.get(15)?,
        first_seen: row.get(16)?,
        last_seen: row.get(17)?,
        approved_at: row.get(18)?,
        approved_by: row.get(19)?,
        tags: row.get(20)?,
        source: row.get(21)?,
        extra: row.get(22)?,
        location_count: row.get(23)?,
        outlier_count: row.get(24)?,
    })
}

impl PatternRow {
    /// Decode into a pattern with empty location lists.
    fn into_pattern(self) -> Result<Pattern, StorageError> {
        Ok(Pattern {
            id: self.id,
            category: parse_enum(&self.category)?,
            subcategory: self.subcategory,
            name: self.name,
            description: self.description,
            detector: DetectorDescriptor {
                detector_type: parse_enum(&self.detector_type)?,
                config: from_json(&self.detector_config)?,
            },
            confidence: ConfidenceInfo {
                frequency: self.frequency,
                consistency: self.consistency,
                age: self.age,
                spread: self.spread,
                score: self.score,
                level: parse_enum(&self.level)?,
            },
            severity: parse_enum(&self.severity)?,
            auto_fixable: self.auto_fixable,
            status: parse_enum(&self.status)?,
            locations: Vec::new(),
            outliers: Vec::new(),
            metadata: PatternMetadata {
                first_seen: ts_from_sql(&self.first_seen)?,
                last_seen: ts_from_sql(&self.last_seen)?,
                approved_at: opt_ts_from_sql(self.approved_at)?,
                approved_by: self.approved_by,
                tags: from_json(&self.tags)?,
                source: self.source,
                extra: self.extra.as_deref().map(from_json).transpose()?,
            },
            location_count: self.location_count,
            outlier_count: self.outlier_count,
        })
    }
}

/// Insert the pattern row only. Counters start at zero and are maintained
/// by the location triggers.
pub fn insert_pattern(conn: &Connection, p: &Pattern) -> Result<(), StorageError> {
    conn.prepare_cached(&format!(
        "INSERT INTO patterns ({PATTERN_COLUMNS})
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, 0, 0)"
    ))
    .map_err(sqlite_err)?
    .execute(params![
        p.id,
        p.category.as_str(),
        p.subcategory,
        p.name,
        p.description,
        p.detector.detector_type.as_str(),
        to_json(&p.detector.config)?,
        p.confidence.frequency,
        p.confidence.consistency,
        p.confidence.age,
        p.confidence.spread,
        p.confidence.score,
        p.confidence.level.as_str(),
        p.severity.as_str(),
        p.auto_fixable,
        p.status.as_str(),
        ts_to_sql(&p.metadata.first_seen),
        ts_to_sql(&p.metadata.last_seen),
        p.metadata.approved_at.as_ref().map(ts_to_sql),
        p.metadata.approved_by,
        to_json(&p.metadata.tags)?,
        p.metadata.source,
        p.metadata.extra.as_ref().map(to_json).transpose()?,
    ])
    .map_err(sqlite_err)?;
    Ok(())
}

/// Update every non-counter column of an existing pattern.
/// Returns `false` if no row has this id.
pub fn update_pattern(conn: &Connection, p: &Pattern) -> Result<bool, StorageError> {
    let changed = conn
        .prepare_cached(
            "UPDATE patterns SET
                category = ?2, subcategory = ?3, name = ?4, description = ?5,
                detector_type = ?6, detector_config = ?7,
                confidence_frequency = ?8, confidence_consistency = ?9,
                confidence_age = ?10, confidence_spread = ?11,
                confidence_score = ?12, confidence_level = ?13,
                severity = ?14, auto_fixable = ?15, status = ?16,
                first_seen = ?17, last_seen = ?18, approved_at = ?19, approved_by = ?20,
                tags = ?21, source = ?22, extra = ?23,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE id = ?1",
        )
        .map_err(sqlite_err)?
        .execute(params![
            p.id,
            p.category.as_str(),
            p.subcategory,
            p.name,
            p.description,
            p.detector.detector_type.as_str(),
            to_json(&p.detector.config)?,
            p.confidence.frequency,
            p.confidence.consistency,
            p.confidence.age,
            p.confidence.spread,
            p.confidence.score,
            p.confidence.level.as_str(),
            p.severity.as_str(),
            p.auto_fixable,
            p.status.as_str(),
            ts_to_sql(&p.metadata.first_seen),
            ts_to_sql(&p.metadata.last_seen),
            p.metadata.approved_at.as_ref().map(ts_to_sql),
            p.metadata.approved_by,
            to_json(&p.metadata.tags)?,
            p.metadata.source,
            p.metadata.extra.as_ref().map(to_json).transpose()?,
        ])
        .map_err(sqlite_err)?;
    Ok(changed > 0)
}

/// Delete a pattern; its locations go with it through `ON DELETE CASCADE`.
pub fn delete_pattern(conn: &Connection, id: &str) -> Result<bool, StorageError> {
    let changed = conn
        .execute("DELETE FROM patterns WHERE id = ?1", params![id])
        .map_err(sqlite_err)?;
    Ok(changed > 0)
}

/// Load one pattern without its locations.
pub fn get_pattern_row(conn: &Connection, id: &str) -> Result<Option<Pattern>, StorageError> {
    let row = conn
        .prepare_cached(&format!("SELECT {PATTERN_COLUMNS} FROM patterns WHERE id = ?1"))
        .map_err(sqlite_err)?
        .query_row(params![id], map_pattern_row)
        .optional()
        .map_err(sqlite_err)?;
    row.map(PatternRow::into_pattern).transpose()
}

/// Load every pattern row (without locations), ordered by id.
pub fn all_pattern_rows(conn: &Connection) -> Result<Vec<Pattern>, StorageError> {
    let mut stmt = conn
        .prepare_cached(&format!("SELECT {PATTERN_COLUMNS} FROM patterns ORDER BY id"))
        .map_err(sqlite_err)?;
    let rows = stmt
        .query_map([], map_pattern_row)
        .map_err(sqlite_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(sqlite_err)?;
    rows.into_iter().map(PatternRow::into_pattern).collect()
}

pub fn delete_all_patterns(conn: &Connection) -> Result<usize, StorageError> {
    conn.execute("DELETE FROM patterns", []).map_err(sqlite_err)
}

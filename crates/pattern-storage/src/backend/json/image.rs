//! In-memory image of a JSON store and the mutation rules applied to it.
//!
//! Every check here has a counterpart constraint in the SQLite schema, and
//! every change record matches what the SQLite triggers would log.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use pattern_core::errors::StorageError;
use pattern_core::types::{
    ChangeOperation, ChangeRecord, LocationKey, Pattern, PatternCategory, PatternHistory,
    PatternLocation, PatternStatus, Severity, SeverityConfig, Snapshot,
};
use serde::{Deserialize, Serialize};

use crate::batch::Mutation;

/// Persisted change log document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogDoc {
    pub next_id: i64,
    pub records: Vec<ChangeRecord>,
}

/// The file a piece of state lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Shard {
    Patterns(PatternStatus, PatternCategory),
    History,
    Snapshot(NaiveDate),
    Severity,
    ChangeLog,
}

#[derive(Debug, Clone, Default)]
pub struct StoreImage {
    pub patterns: BTreeMap<String, Pattern>,
    pub histories: BTreeMap<String, PatternHistory>,
    pub snapshots: BTreeMap<NaiveDate, Snapshot>,
    pub severity: Option<SeverityConfig>,
    pub changes: ChangeLogDoc,
    /// Commit counter shared through `meta.json` so a writer can tell when
    /// another process has changed the files.
    pub generation: u64,
}

fn shard_of(p: &Pattern) -> Shard {
    Shard::Patterns(p.status, p.category)
}

fn location_row_id(pattern_id: &str, key: &LocationKey) -> String {
    format!("{}:{}:{}:{}", pattern_id, key.file, key.line, key.column)
}

fn check_score(entity: &str, field: &str, value: f64) -> Result<(), StorageError> {
    if value.is_nan() || !(0.0..=1.0).contains(&value) {
        return Err(StorageError::constraint(
            entity,
            format!("CHECK constraint failed: {field} must be within [0, 1], got {value}"),
        ));
    }
    Ok(())
}

fn check_location(loc: &PatternLocation) -> Result<(), StorageError> {
    if let Some(c) = loc.confidence {
        check_score("pattern_locations", "confidence", c)?;
    }
    Ok(())
}

fn missing_pattern(pattern_id: &str) -> StorageError {
    StorageError::constraint(
        "pattern_locations",
        format!("FOREIGN KEY constraint failed: no pattern '{pattern_id}'"),
    )
}

fn check_severity_config(config: &SeverityConfig) -> Result<(), StorageError> {
    if config.escalation.threshold == 0 {
        return Err(StorageError::constraint(
            "severity_settings",
            "CHECK constraint failed: escalation_threshold > 0",
        ));
    }
    for rule in &config.escalation.rules {
        if rule.from == Severity::Error {
            return Err(StorageError::constraint(
                "escalation_rules",
                "CHECK constraint failed: from_severity cannot be error",
            ));
        }
        if rule.to == Severity::Hint {
            return Err(StorageError::constraint(
                "escalation_rules",
                "CHECK constraint failed: to_severity cannot be hint",
            ));
        }
        if rule.after_count == Some(0) {
            return Err(StorageError::constraint(
                "escalation_rules",
                "CHECK constraint failed: after_count > 0",
            ));
        }
    }
    Ok(())
}

/// Row ids of a severity config as the SQLite override and rule tables
/// would key them.
fn severity_rows(config: &SeverityConfig) -> (Vec<String>, Vec<String>) {
    let mut overrides: Vec<String> = config
        .pattern_overrides
        .keys()
        .map(|id| format!("pattern:{id}"))
        .collect();
    overrides.extend(
        config
            .category_overrides
            .keys()
            .map(|c| format!("category:{}", c.as_str())),
    );
    overrides.extend(
        config
            .category_defaults
            .keys()
            .map(|c| format!("category_default:{}", c.as_str())),
    );
    let rules = (0..config.escalation.rules.len())
        .map(|i| i.to_string())
        .collect();
    (overrides, rules)
}

impl StoreImage {
    fn log(&mut self, table: &str, row_id: String, operation: ChangeOperation, now: DateTime<Utc>) {
        self.changes.next_id += 1;
        self.changes.records.push(ChangeRecord {
            id: self.changes.next_id,
            table_name: table.to_string(),
            row_id,
            operation,
            changed_at: now,
            synced: false,
        });
    }

    /// Apply one mutation, recording the shards it dirtied. On error the
    /// image may be partially modified; callers work on a clone.
    pub fn apply(
        &mut self,
        mutation: &Mutation,
        now: DateTime<Utc>,
        dirty: &mut BTreeSet<Shard>,
    ) -> Result<(), StorageError> {
        let logged_before = self.changes.next_id;
        match mutation {
            Mutation::InsertPattern(p) => self.insert_pattern(p, now, dirty)?,
            Mutation::UpdatePattern(p) => self.update_pattern(p, now, dirty)?,
            Mutation::DeletePattern { id } => self.delete_pattern(id, now, dirty),
            Mutation::UpsertLocation {
                pattern_id,
                location,
            } => self.upsert_location(pattern_id, location, now, dirty)?,
            Mutation::RemoveLocation { pattern_id, key } => {
                self.remove_location(pattern_id, key, now, dirty)
            }
            Mutation::ReplaceLocations(p) => self.replace_locations(p, now, dirty)?,
            Mutation::PutHistory(h) => {
                self.put_history(h)?;
                dirty.insert(Shard::History);
            }
            Mutation::DeleteHistory { pattern_id } => {
                if self.histories.remove(pattern_id).is_some() {
                    dirty.insert(Shard::History);
                }
            }
            Mutation::PutSnapshot(s) => {
                let op = if self.snapshots.contains_key(&s.date) {
                    ChangeOperation::Update
                } else {
                    ChangeOperation::Insert
                };
                self.snapshots.insert(s.date, s.clone());
                self.log("snapshots", s.date.format("%Y-%m-%d").to_string(), op, now);
                dirty.insert(Shard::Snapshot(s.date));
            }
            Mutation::DeleteSnapshot { date } => {
                if self.snapshots.remove(date).is_some() {
                    self.log(
                        "snapshots",
                        date.format("%Y-%m-%d").to_string(),
                        ChangeOperation::Delete,
                        now,
                    );
                    dirty.insert(Shard::Snapshot(*date));
                }
            }
            Mutation::PutSeverityConfig(config) => {
                check_severity_config(config)?;
                self.clear_severity(now);
                let (overrides, rules) = severity_rows(config);
                for row in overrides {
                    self.log("severity_overrides", row, ChangeOperation::Insert, now);
                }
                for row in rules {
                    self.log("escalation_rules", row, ChangeOperation::Insert, now);
                }
                self.severity = Some(config.clone());
                dirty.insert(Shard::Severity);
            }
            Mutation::ClearAll => {
                let ids: Vec<String> = self.patterns.keys().cloned().collect();
                for id in ids {
                    self.delete_pattern(&id, now, dirty);
                }
                if !self.histories.is_empty() {
                    self.histories.clear();
                    dirty.insert(Shard::History);
                }
                let dates: Vec<NaiveDate> = self.snapshots.keys().copied().collect();
                for date in dates {
                    self.apply(&Mutation::DeleteSnapshot { date }, now, dirty)?;
                }
                if self.severity.is_some() {
                    self.clear_severity(now);
                    dirty.insert(Shard::Severity);
                }
            }
        }
        if self.changes.next_id != logged_before {
            dirty.insert(Shard::ChangeLog);
        }
        Ok(())
    }

    fn insert_pattern(
        &mut self,
        p: &Pattern,
        now: DateTime<Utc>,
        dirty: &mut BTreeSet<Shard>,
    ) -> Result<(), StorageError> {
        if self.patterns.contains_key(&p.id) {
            return Err(StorageError::constraint(
                "patterns",
                format!("UNIQUE constraint failed: patterns.id ('{}')", p.id),
            ));
        }
        check_score("patterns", "confidence_score", p.confidence.score)?;

        let mut stored = p.clone();
        stored.locations.clear();
        stored.outliers.clear();
        stored.refresh_counts();
        self.patterns.insert(p.id.clone(), stored);
        self.log("patterns", p.id.clone(), ChangeOperation::Insert, now);
        for loc in p.all_locations() {
            self.upsert_location(&p.id, loc, now, dirty)?;
        }
        dirty.insert(shard_of(p));
        Ok(())
    }

    fn update_pattern(
        &mut self,
        p: &Pattern,
        now: DateTime<Utc>,
        dirty: &mut BTreeSet<Shard>,
    ) -> Result<(), StorageError> {
        check_score("patterns", "confidence_score", p.confidence.score)?;
        let Some(existing) = self.patterns.get_mut(&p.id) else {
            return Err(StorageError::constraint(
                "patterns",
                format!("no pattern with id '{}' to update", p.id),
            ));
        };
        dirty.insert(shard_of(existing));
        let locations = std::mem::take(&mut existing.locations);
        let outliers = std::mem::take(&mut existing.outliers);
        *existing = Pattern {
            locations,
            outliers,
            ..p.clone()
        };
        existing.refresh_counts();
        dirty.insert(shard_of(existing));
        self.log("patterns", p.id.clone(), ChangeOperation::Update, now);
        Ok(())
    }

    fn delete_pattern(&mut self, id: &str, now: DateTime<Utc>, dirty: &mut BTreeSet<Shard>) {
        let Some(removed) = self.patterns.remove(id) else {
            return;
        };
        dirty.insert(shard_of(&removed));
        for loc in removed.all_locations() {
            self.log(
                "pattern_locations",
                location_row_id(id, &loc.key()),
                ChangeOperation::Delete,
                now,
            );
        }
        self.log("patterns", id.to_string(), ChangeOperation::Delete, now);
    }

    fn upsert_location(
        &mut self,
        pattern_id: &str,
        loc: &PatternLocation,
        now: DateTime<Utc>,
        dirty: &mut BTreeSet<Shard>,
    ) -> Result<(), StorageError> {
        check_location(loc)?;
        let pattern = self
            .patterns
            .get_mut(pattern_id)
            .ok_or_else(|| missing_pattern(pattern_id))?;
        let replaced = pattern.upsert_location(loc.clone());
        dirty.insert(shard_of(pattern));
        let op = if replaced {
            ChangeOperation::Update
        } else {
            ChangeOperation::Insert
        };
        self.log(
            "pattern_locations",
            location_row_id(pattern_id, &loc.key()),
            op,
            now,
        );
        Ok(())
    }

    fn remove_location(
        &mut self,
        pattern_id: &str,
        key: &LocationKey,
        now: DateTime<Utc>,
        dirty: &mut BTreeSet<Shard>,
    ) {
        let Some(pattern) = self.patterns.get_mut(pattern_id) else {
            return;
        };
        if pattern.remove_location(key).is_some() {
            dirty.insert(shard_of(pattern));
            self.log(
                "pattern_locations",
                location_row_id(pattern_id, key),
                ChangeOperation::Delete,
                now,
            );
        }
    }

    fn replace_locations(
        &mut self,
        p: &Pattern,
        now: DateTime<Utc>,
        dirty: &mut BTreeSet<Shard>,
    ) -> Result<(), StorageError> {
        let Some(existing) = self.patterns.get_mut(&p.id) else {
            if p.all_locations().next().is_some() {
                return Err(missing_pattern(&p.id));
            }
            return Ok(());
        };
        let old: Vec<LocationKey> = existing.all_locations().map(PatternLocation::key).collect();
        existing.locations.clear();
        existing.outliers.clear();
        existing.refresh_counts();
        dirty.insert(shard_of(existing));
        for key in old {
            self.log(
                "pattern_locations",
                location_row_id(&p.id, &key),
                ChangeOperation::Delete,
                now,
            );
        }
        for loc in p.all_locations() {
            self.upsert_location(&p.id, loc, now, dirty)?;
        }
        Ok(())
    }

    fn put_history(&mut self, history: &PatternHistory) -> Result<(), StorageError> {
        let mut ids = BTreeSet::new();
        for event in &history.events {
            if !ids.insert(event.id.as_str()) {
                return Err(StorageError::constraint(
                    "pattern_history_events",
                    format!("UNIQUE constraint failed: pattern_history_events.id ('{}')", event.id),
                ));
            }
        }
        let clash = self
            .histories
            .values()
            .filter(|h| h.pattern_id != history.pattern_id)
            .flat_map(|h| h.events.iter())
            .find(|e| ids.contains(e.id.as_str()));
        if let Some(event) = clash {
            return Err(StorageError::constraint(
                "pattern_history_events",
                format!("UNIQUE constraint failed: pattern_history_events.id ('{}')", event.id),
            ));
        }
        self.histories
            .insert(history.pattern_id.clone(), history.clone());
        Ok(())
    }

    fn clear_severity(&mut self, now: DateTime<Utc>) {
        if let Some(old) = self.severity.take() {
            let (overrides, rules) = severity_rows(&old);
            for row in overrides {
                self.log("severity_overrides", row, ChangeOperation::Delete, now);
            }
            for row in rules {
                self.log("escalation_rules", row, ChangeOperation::Delete, now);
            }
        }
    }

    /// Patterns stored in one `(status, category)` shard, ordered by id.
    pub fn shard_patterns(
        &self,
        status: PatternStatus,
        category: PatternCategory,
    ) -> Vec<&Pattern> {
        self.patterns
            .values()
            .filter(|p| p.status == status && p.category == category)
            .collect()
    }

    /// Mark the given change ids synced. Returns how many flipped.
    pub fn mark_synced(&mut self, ids: &[i64]) -> usize {
        let wanted: BTreeSet<i64> = ids.iter().copied().collect();
        let mut flipped = 0;
        for record in self.changes.records.iter_mut() {
            if !record.synced && wanted.contains(&record.id) {
                record.synced = true;
                flipped += 1;
            }
        }
        flipped
    }

    pub fn prune_synced(&mut self, before: DateTime<Utc>) -> usize {
        let len = self.changes.records.len();
        self.changes
            .records
            .retain(|r| !(r.synced && r.changed_at < before));
        len - self.changes.records.len()
    }

    /// Consistency problems; empty when the image is sound.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for p in self.patterns.values() {
            if p.location_count as usize != p.locations.len()
                || p.outlier_count as usize != p.outliers.len()
            {
                problems.push(format!("stale counters on pattern {}", p.id));
            }
            let misfiled = p.locations.iter().any(|l| l.is_outlier)
                || p.outliers.iter().any(|l| !l.is_outlier);
            if misfiled {
                problems.push(format!("outlier flag disagrees with list on pattern {}", p.id));
            }
            let keys: BTreeSet<LocationKey> = p.all_locations().map(PatternLocation::key).collect();
            if keys.len() != p.locations.len() + p.outliers.len() {
                problems.push(format!("duplicate location keys on pattern {}", p.id));
            }
            if p.confidence.score.is_nan() || !(0.0..=1.0).contains(&p.confidence.score) {
                problems.push(format!("confidence score out of range on pattern {}", p.id));
            }
        }
        if self
            .changes
            .records
            .windows(2)
            .any(|w| w[0].id >= w[1].id)
        {
            problems.push("change log ids are not strictly increasing".to_string());
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pattern_core::types::{
        ConfidenceInfo, ConfidenceLevel, DetectorDescriptor, DetectorType, EscalationRule,
    };

    fn pattern(id: &str) -> Pattern {
        Pattern::new(
            id,
            PatternCategory::Api,
            "route naming",
            DetectorDescriptor::new(DetectorType::Regex),
            ConfidenceInfo::new(0.9, ConfidenceLevel::High),
            Severity::Warning,
        )
        .with_location(PatternLocation::new("a.ts", 1, 0))
        .with_location(PatternLocation::new("b.ts", 2, 0).outlier("casing"))
    }

    fn apply(image: &mut StoreImage, m: Mutation) -> Result<BTreeSet<Shard>, StorageError> {
        let mut dirty = BTreeSet::new();
        image.apply(&m, Utc::now(), &mut dirty)?;
        Ok(dirty)
    }

    #[test]
    fn insert_logs_pattern_and_locations() {
        let mut image = StoreImage::default();
        let dirty = apply(&mut image, Mutation::InsertPattern(pattern("p1"))).unwrap();
        assert!(dirty.contains(&Shard::Patterns(PatternStatus::Discovered, PatternCategory::Api)));
        assert!(dirty.contains(&Shard::ChangeLog));
        let stored = &image.patterns["p1"];
        assert_eq!((stored.location_count, stored.outlier_count), (1, 1));
        assert_eq!(image.changes.records.len(), 3);
        assert!(image.problems().is_empty());
    }

    #[test]
    fn duplicate_insert_is_a_constraint_violation() {
        let mut image = StoreImage::default();
        apply(&mut image, Mutation::InsertPattern(pattern("p1"))).unwrap();
        let err = apply(&mut image, Mutation::InsertPattern(pattern("p1"))).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn location_for_missing_pattern_fails_foreign_key() {
        let mut image = StoreImage::default();
        let err = apply(
            &mut image,
            Mutation::UpsertLocation {
                pattern_id: "ghost".into(),
                location: PatternLocation::new("x.ts", 1, 1),
            },
        )
        .unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn status_change_dirties_both_shards() {
        let mut image = StoreImage::default();
        apply(&mut image, Mutation::InsertPattern(pattern("p1"))).unwrap();
        let mut approved = image.patterns["p1"].clone();
        approved.status = PatternStatus::Approved;
        let dirty = apply(&mut image, Mutation::UpdatePattern(approved)).unwrap();
        assert!(dirty.contains(&Shard::Patterns(PatternStatus::Discovered, PatternCategory::Api)));
        assert!(dirty.contains(&Shard::Patterns(PatternStatus::Approved, PatternCategory::Api)));
        assert_eq!(image.patterns["p1"].location_count, 1);
    }

    #[test]
    fn escalation_from_error_is_rejected() {
        let mut image = StoreImage::default();
        let mut config = SeverityConfig::default();
        config
            .escalation
            .rules
            .push(EscalationRule::new(Severity::Error, Severity::Error, 2));
        assert!(apply(&mut image, Mutation::PutSeverityConfig(config))
            .unwrap_err()
            .is_constraint_violation());
    }

    #[test]
    fn mark_synced_is_idempotent() {
        let mut image = StoreImage::default();
        apply(&mut image, Mutation::InsertPattern(pattern("p1"))).unwrap();
        assert_eq!(image.mark_synced(&[1, 2]), 2);
        assert_eq!(image.mark_synced(&[1, 2]), 0);
    }
}

//! A caller unit of work over the pattern index.
//!
//! Operations validate against the committed index plus this transaction's
//! own staged changes, and record the storage mutations they imply. Nothing
//! reaches the backend or the index until the store commits the batch.

use chrono::{DateTime, Utc};
use pattern_core::errors::{PatternError, StorageError};
use pattern_core::types::{
    LocationKey, Pattern, PatternCandidate, PatternLocation, PatternStatus,
};
use pattern_storage::{Mutation, WriteBatch};
use rustc_hash::FxHashMap;

use super::update::PatternUpdate;

/// What a committed operation changed, replayed to observers and the
/// history ledger after the batch is durable.
#[derive(Debug, Clone)]
pub(crate) enum Effect {
    Created(Pattern),
    Updated {
        before: Pattern,
        after: Pattern,
        changed: Vec<&'static str>,
    },
    Deleted(Pattern),
    Approved {
        before: Pattern,
        after: Pattern,
        user: Option<String>,
    },
    Ignored {
        before: Pattern,
        after: Pattern,
        user: Option<String>,
    },
}

/// Outcome of [`StoreTransaction::upsert_candidate`].
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateResult {
    pub pattern: Pattern,
    /// `true` when the candidate created a new pattern.
    pub inserted: bool,
}

pub struct StoreTransaction<'a> {
    committed: &'a FxHashMap<String, Pattern>,
    /// `None` marks a pattern deleted in this transaction.
    staged: FxHashMap<String, Option<Pattern>>,
    batch: WriteBatch,
    effects: Vec<Effect>,
    now: DateTime<Utc>,
}

pub(crate) struct StagedChanges {
    pub staged: FxHashMap<String, Option<Pattern>>,
    pub batch: WriteBatch,
    pub effects: Vec<Effect>,
}

fn duplicate(id: &str) -> PatternError {
    StorageError::constraint(
        "patterns",
        format!("UNIQUE constraint failed: patterns.id ('{id}')"),
    )
    .into()
}

impl<'a> StoreTransaction<'a> {
    pub(crate) fn new(committed: &'a FxHashMap<String, Pattern>, now: DateTime<Utc>) -> Self {
        Self {
            committed,
            staged: FxHashMap::default(),
            batch: WriteBatch::new(),
            effects: Vec::new(),
            now,
        }
    }

    pub(crate) fn into_changes(self) -> StagedChanges {
        StagedChanges {
            staged: self.staged,
            batch: self.batch,
            effects: self.effects,
        }
    }

    /// Timestamp shared by every operation in this transaction.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// The pattern as this transaction currently sees it.
    pub fn get(&self, id: &str) -> Option<&Pattern> {
        match self.staged.get(id) {
            Some(staged) => staged.as_ref(),
            None => self.committed.get(id),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    fn require(&self, id: &str) -> Result<Pattern, PatternError> {
        self.get(id)
            .cloned()
            .ok_or_else(|| PatternError::not_found(id))
    }

    fn stage(&mut self, pattern: Pattern) {
        self.staged.insert(pattern.id.clone(), Some(pattern));
    }

    /// Insert a new pattern. Fails with a constraint violation if the id is
    /// taken.
    pub fn add(&mut self, mut pattern: Pattern) -> Result<Pattern, PatternError> {
        if self.contains(&pattern.id) {
            return Err(duplicate(&pattern.id));
        }
        pattern.confidence = pattern.confidence.clamped();
        pattern.normalize();
        self.batch.push(Mutation::InsertPattern(pattern.clone()));
        self.stage(pattern.clone());
        self.effects.push(Effect::Created(pattern.clone()));
        Ok(pattern)
    }

    /// Merge `update` into the pattern. An update that changes nothing
    /// writes nothing.
    pub fn update(&mut self, id: &str, update: PatternUpdate) -> Result<Pattern, PatternError> {
        let before = self.require(id)?;
        let mut after = before.clone();
        let changed = update.apply_to(&mut after);
        if changed.is_empty() {
            return Ok(after);
        }
        self.batch.push(Mutation::UpdatePattern(after.clone()));
        if changed.contains(&"locations") {
            self.batch.push(Mutation::ReplaceLocations(after.clone()));
        }
        self.stage(after.clone());
        self.effects.push(Effect::Updated {
            before,
            after: after.clone(),
            changed,
        });
        Ok(after)
    }

    /// Delete the pattern and, through the cascade, its locations. History
    /// is kept.
    pub fn delete(&mut self, id: &str) -> Result<Pattern, PatternError> {
        let removed = self.require(id)?;
        self.batch.push(Mutation::DeletePattern { id: id.to_string() });
        self.staged.insert(id.to_string(), None);
        self.effects.push(Effect::Deleted(removed.clone()));
        Ok(removed)
    }

    fn transition(&self, id: &str, to: PatternStatus) -> Result<Pattern, PatternError> {
        let pattern = self.require(id)?;
        if !pattern.status.can_transition_to(to) {
            return Err(PatternError::InvalidStateTransition {
                id: id.to_string(),
                from: pattern.status,
                to,
            });
        }
        Ok(pattern)
    }

    pub fn approve(&mut self, id: &str, user: Option<&str>) -> Result<Pattern, PatternError> {
        let before = self.transition(id, PatternStatus::Approved)?;
        let mut after = before.clone();
        after.status = PatternStatus::Approved;
        after.metadata.approved_at = Some(self.now);
        after.metadata.approved_by = user.map(str::to_string);

        self.batch.push(Mutation::UpdatePattern(after.clone()));
        self.stage(after.clone());
        self.effects.push(Effect::Approved {
            before,
            after: after.clone(),
            user: user.map(str::to_string),
        });
        Ok(after)
    }

    pub fn ignore(&mut self, id: &str, user: Option<&str>) -> Result<Pattern, PatternError> {
        let before = self.transition(id, PatternStatus::Ignored)?;
        let mut after = before.clone();
        after.status = PatternStatus::Ignored;
        after.metadata.approved_at = None;
        after.metadata.approved_by = None;

        self.batch.push(Mutation::UpdatePattern(after.clone()));
        self.stage(after.clone());
        self.effects.push(Effect::Ignored {
            before,
            after: after.clone(),
            user: user.map(str::to_string),
        });
        Ok(after)
    }

    /// Add a location, replacing one with the same key. This is also how an
    /// outlier flag is flipped.
    pub fn add_location(
        &mut self,
        id: &str,
        location: PatternLocation,
    ) -> Result<Pattern, PatternError> {
        let before = self.require(id)?;
        let mut after = before.clone();
        after.upsert_location(location.clone());
        if after == before {
            return Ok(after);
        }
        self.batch.push(Mutation::UpsertLocation {
            pattern_id: id.to_string(),
            location,
        });
        self.stage(after.clone());
        self.effects.push(Effect::Updated {
            before,
            after: after.clone(),
            changed: vec!["locations"],
        });
        Ok(after)
    }

    /// Remove the location with `key`. Returns the removed location, or
    /// `None` when the pattern has no such location.
    pub fn remove_location(
        &mut self,
        id: &str,
        key: &LocationKey,
    ) -> Result<Option<PatternLocation>, PatternError> {
        let before = self.require(id)?;
        let mut after = before.clone();
        let Some(removed) = after.remove_location(key) else {
            return Ok(None);
        };
        self.batch.push(Mutation::RemoveLocation {
            pattern_id: id.to_string(),
            key: key.clone(),
        });
        self.stage(after.clone());
        self.effects.push(Effect::Updated {
            before,
            after,
            changed: vec!["locations"],
        });
        Ok(Some(removed))
    }

    /// Insert a detector candidate, or refresh the existing pattern with the
    /// same resolved id in place.
    pub fn upsert_candidate(
        &mut self,
        candidate: PatternCandidate,
    ) -> Result<CandidateResult, PatternError> {
        let id = candidate.resolved_id();
        if self.contains(&id) {
            let update = PatternUpdate::from_candidate(&candidate, self.now);
            let pattern = self.update(&id, update)?;
            Ok(CandidateResult {
                pattern,
                inserted: false,
            })
        } else {
            let pattern = self.add(candidate.into_pattern(self.now))?;
            Ok(CandidateResult {
                pattern,
                inserted: true,
            })
        }
    }
}

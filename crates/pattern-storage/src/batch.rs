//! Write batches: an ordered list of mutations committed atomically.

use chrono::NaiveDate;
use pattern_core::types::{
    LocationKey, Pattern, PatternHistory, PatternLocation, SeverityConfig, Snapshot,
};

/// One write against the store. Backends apply mutations in order and roll
/// back the whole batch on the first failure.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Insert the pattern row and all of its locations.
    InsertPattern(Pattern),
    /// Rewrite the pattern row. Locations are left alone.
    UpdatePattern(Pattern),
    /// Delete the pattern and, by cascade, its locations. History is kept.
    DeletePattern { id: String },
    UpsertLocation {
        pattern_id: String,
        location: PatternLocation,
    },
    RemoveLocation {
        pattern_id: String,
        key: LocationKey,
    },
    /// Replace every location of the pattern with the ones it carries.
    ReplaceLocations(Pattern),
    PutHistory(PatternHistory),
    DeleteHistory { pattern_id: String },
    PutSnapshot(Snapshot),
    DeleteSnapshot { date: NaiveDate },
    PutSeverityConfig(SeverityConfig),
    /// Remove every pattern, history, snapshot, and the severity config.
    ClearAll,
}

impl Mutation {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsertPattern(_) => "insert_pattern",
            Self::UpdatePattern(_) => "update_pattern",
            Self::DeletePattern { .. } => "delete_pattern",
            Self::UpsertLocation { .. } => "upsert_location",
            Self::RemoveLocation { .. } => "remove_location",
            Self::ReplaceLocations(_) => "replace_locations",
            Self::PutHistory(_) => "put_history",
            Self::DeleteHistory { .. } => "delete_history",
            Self::PutSnapshot(_) => "put_snapshot",
            Self::DeleteSnapshot { .. } => "delete_snapshot",
            Self::PutSeverityConfig(_) => "put_severity_config",
            Self::ClearAll => "clear_all",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    mutations: Vec<Mutation>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mutation: Mutation) -> &mut Self {
        self.mutations.push(mutation);
        self
    }

    pub fn extend(&mut self, other: WriteBatch) {
        self.mutations.extend(other.mutations);
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

impl From<Vec<Mutation>> for WriteBatch {
    fn from(mutations: Vec<Mutation>) -> Self {
        Self { mutations }
    }
}

impl FromIterator<Mutation> for WriteBatch {
    fn from_iter<I: IntoIterator<Item = Mutation>>(iter: I) -> Self {
        Self {
            mutations: iter.into_iter().collect(),
        }
    }
}

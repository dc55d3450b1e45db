//! PatternEventHandler trait with no-op defaults.

use super::types::*;

/// Observer for lifecycle notifications. Every method has a no-op default,
/// so implementors only override what they consume.
///
/// Handlers run synchronously on the caller's thread after the change has
/// been committed.
pub trait PatternEventHandler: Send + Sync {
    fn on_pattern_created(&self, _event: &PatternCreatedEvent) {}
    fn on_pattern_updated(&self, _event: &PatternUpdatedEvent) {}
    fn on_pattern_deleted(&self, _event: &PatternDeletedEvent) {}
    fn on_pattern_approved(&self, _event: &PatternApprovedEvent) {}
    fn on_pattern_ignored(&self, _event: &PatternIgnoredEvent) {}
    fn on_history_recorded(&self, _event: &HistoryRecordedEvent) {}
    fn on_history_pruned(&self, _event: &HistoryPrunedEvent) {}
    fn on_snapshot_created(&self, _event: &SnapshotCreatedEvent) {}
}

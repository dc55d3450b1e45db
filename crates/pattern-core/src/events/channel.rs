//! Typed message channel adapter over the observer interface.

use crossbeam_channel::{Receiver, Sender};

use super::handler::PatternEventHandler;
use super::types::*;

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    PatternCreated(PatternCreatedEvent),
    PatternUpdated(PatternUpdatedEvent),
    PatternDeleted(PatternDeletedEvent),
    PatternApproved(PatternApprovedEvent),
    PatternIgnored(PatternIgnoredEvent),
    HistoryRecorded(HistoryRecordedEvent),
    HistoryPruned(HistoryPrunedEvent),
    SnapshotCreated(SnapshotCreatedEvent),
}

/// Forwards every notification into an unbounded channel. Sends after the
/// receiver is dropped are discarded.
pub struct ChannelEventHandler {
    tx: Sender<LifecycleEvent>,
}

impl ChannelEventHandler {
    pub fn new() -> (Self, Receiver<LifecycleEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }

    fn send(&self, event: LifecycleEvent) {
        let _ = self.tx.send(event);
    }
}

impl PatternEventHandler for ChannelEventHandler {
    fn on_pattern_created(&self, event: &PatternCreatedEvent) {
        self.send(LifecycleEvent::PatternCreated(event.clone()));
    }

    fn on_pattern_updated(&self, event: &PatternUpdatedEvent) {
        self.send(LifecycleEvent::PatternUpdated(event.clone()));
    }

    fn on_pattern_deleted(&self, event: &PatternDeletedEvent) {
        self.send(LifecycleEvent::PatternDeleted(event.clone()));
    }

    fn on_pattern_approved(&self, event: &PatternApprovedEvent) {
        self.send(LifecycleEvent::PatternApproved(event.clone()));
    }

    fn on_pattern_ignored(&self, event: &PatternIgnoredEvent) {
        self.send(LifecycleEvent::PatternIgnored(event.clone()));
    }

    fn on_history_recorded(&self, event: &HistoryRecordedEvent) {
        self.send(LifecycleEvent::HistoryRecorded(event.clone()));
    }

    fn on_history_pruned(&self, event: &HistoryPrunedEvent) {
        self.send(LifecycleEvent::HistoryPruned(event.clone()));
    }

    fn on_snapshot_created(&self, event: &SnapshotCreatedEvent) {
        self.send(LifecycleEvent::SnapshotCreated(event.clone()));
    }
}

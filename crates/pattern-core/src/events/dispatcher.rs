//! Synchronous event dispatch with zero overhead when no handlers are registered.

use std::sync::Arc;

use super::handler::PatternEventHandler;
use super::types::*;

/// Synchronous event dispatcher wrapping a list of handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn PatternEventHandler>>,
}

impl EventDispatcher {
    /// Create a new empty dispatcher.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Register an event handler.
    pub fn register(&mut self, handler: Arc<dyn PatternEventHandler>) {
        self.handlers.push(handler);
    }

    /// Returns the number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Emit an event to all registered handlers.
    /// Handlers that panic are caught and do not prevent subsequent handlers
    /// from receiving the event.
    fn emit<F: Fn(&dyn PatternEventHandler)>(&self, event: &'static str, f: F) {
        for handler in &self.handlers {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                f(handler.as_ref());
            }));
            if result.is_err() {
                tracing::warn!(event, "event handler panicked; continuing");
            }
        }
    }

    // ---- Pattern Lifecycle ----
    pub fn emit_pattern_created(&self, event: &PatternCreatedEvent) {
        self.emit("pattern_created", |h| h.on_pattern_created(event));
    }

    pub fn emit_pattern_updated(&self, event: &PatternUpdatedEvent) {
        self.emit("pattern_updated", |h| h.on_pattern_updated(event));
    }

    pub fn emit_pattern_deleted(&self, event: &PatternDeletedEvent) {
        self.emit("pattern_deleted", |h| h.on_pattern_deleted(event));
    }

    pub fn emit_pattern_approved(&self, event: &PatternApprovedEvent) {
        self.emit("pattern_approved", |h| h.on_pattern_approved(event));
    }

    pub fn emit_pattern_ignored(&self, event: &PatternIgnoredEvent) {
        self.emit("pattern_ignored", |h| h.on_pattern_ignored(event));
    }

    // ---- History ----
    pub fn emit_history_recorded(&self, event: &HistoryRecordedEvent) {
        self.emit("history_recorded", |h| h.on_history_recorded(event));
    }

    pub fn emit_history_pruned(&self, event: &HistoryPrunedEvent) {
        self.emit("history_pruned", |h| h.on_history_pruned(event));
    }

    // ---- Snapshots ----
    pub fn emit_snapshot_created(&self, event: &SnapshotCreatedEvent) {
        self.emit("snapshot_created", |h| h.on_snapshot_created(event));
    }
}

//! Dispatcher fan-out, panic isolation, and the channel adapter.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pattern_core::events::*;
use pattern_core::types::{PatternCategory, PatternStatus};

struct Counting {
    created: AtomicUsize,
}

impl PatternEventHandler for Counting {
    fn on_pattern_created(&self, _event: &PatternCreatedEvent) {
        self.created.fetch_add(1, Ordering::SeqCst);
    }
}

struct Panicking;

impl PatternEventHandler for Panicking {
    fn on_pattern_created(&self, _event: &PatternCreatedEvent) {
        panic!("handler failure");
    }
}

fn created() -> PatternCreatedEvent {
    PatternCreatedEvent {
        pattern_id: "p1".to_string(),
        category: PatternCategory::Api,
        name: "REST".to_string(),
    }
}

#[test]
fn empty_dispatcher_is_a_no_op() {
    let dispatcher = EventDispatcher::new();
    assert_eq!(dispatcher.handler_count(), 0);
    dispatcher.emit_pattern_created(&created());
}

#[test]
fn panicking_handler_does_not_block_later_handlers() {
    let counting = Arc::new(Counting {
        created: AtomicUsize::new(0),
    });
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(Arc::new(Panicking));
    dispatcher.register(counting.clone());

    dispatcher.emit_pattern_created(&created());
    dispatcher.emit_pattern_created(&created());
    assert_eq!(counting.created.load(Ordering::SeqCst), 2);
}

#[test]
fn channel_handler_forwards_typed_events() {
    let (handler, rx) = ChannelEventHandler::new();
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(Arc::new(handler));

    dispatcher.emit_pattern_created(&created());
    dispatcher.emit_pattern_approved(&PatternApprovedEvent {
        pattern_id: "p1".to_string(),
        previous_status: PatternStatus::Discovered,
        approved_by: Some("alice".to_string()),
    });

    assert!(matches!(rx.try_recv().unwrap(), LifecycleEvent::PatternCreated(_)));
    match rx.try_recv().unwrap() {
        LifecycleEvent::PatternApproved(e) => assert_eq!(e.approved_by.as_deref(), Some("alice")),
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(rx.try_recv().is_err());
}

#[test]
fn channel_handler_survives_dropped_receiver() {
    let (handler, rx) = ChannelEventHandler::new();
    drop(rx);
    handler.on_history_pruned(&HistoryPrunedEvent {
        events_removed: 1,
        histories_removed: 0,
    });
}

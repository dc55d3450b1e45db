//! Event system: observer trait with no-op defaults, synchronous dispatch,
//! and a channel adapter for consumers that prefer a message stream.

pub mod channel;
pub mod dispatcher;
pub mod handler;
pub mod types;

pub use channel::{ChannelEventHandler, LifecycleEvent};
pub use dispatcher::EventDispatcher;
pub use handler::PatternEventHandler;
pub use types::*;

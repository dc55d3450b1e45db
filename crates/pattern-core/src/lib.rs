//! Core types, errors, config, events, tracing, and constants for the
//! pattern lifecycle engine.

pub mod config;
pub mod constants;
pub mod errors;
pub mod events;
pub mod tracing;
pub mod types;

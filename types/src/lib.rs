//! Shared types for the TotalMix EQ bridge.
//!
//! This crate contains the JSON wire types spoken by the HTTP API, shared
//! between the bridge backend and its integration tests.

/// Default port for the bridge HTTP server.
pub const DEFAULT_PORT: u16 = 8765;

/// Default UDP port TotalMix listens on for OSC commands (Remote Controller 3).
pub const DEFAULT_DEVICE_SEND_PORT: u16 = 7003;

/// Default UDP port the bridge listens on for OSC replies from TotalMix.
pub const DEFAULT_DEVICE_LISTEN_PORT: u16 = 9003;

pub mod api;
pub mod channel;
pub mod eq;

// Re-export commonly used types
pub use channel::Channel;
pub use eq::{FilterSpec, FilterType, MAX_FILTERS};

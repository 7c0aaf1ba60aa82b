//! Test helper modules for Lullaby Player integration tests
//!
//! Provides reusable test infrastructure components:
//! - PlayerBuilder / TestPlayer: controller wired to the simulated engine
//! - EventLog: synchronous capture of broadcast player events

#![allow(dead_code, unused_imports)]

pub mod event_log;
pub mod fixtures;

// Re-export commonly used types
pub use event_log::{CommandTrace, EventLog};
pub use fixtures::{advance, test_config, PlayerBuilder, TestPlayer};

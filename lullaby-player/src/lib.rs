//! # Lullaby Player Library (lullaby-player)
//!
//! Control plane of a dual-slot audio playback engine for long-form,
//! session-based audio.
//!
//! **Purpose:** Serialize user and system commands, keep one authoritative
//! playback state, and run interruptible crossfades between two
//! interchangeable engine slots.
//!
//! **Architecture:** `PlaybackController` (public handle) -> `CommandQueue`
//! -> `PlayerCore` (single worker) -> `CrossfadeOrchestrator` + `StateStore`
//! -> `AudioEngine` port.

pub mod config;
pub mod crossfade;
pub mod engine;
pub mod error;
pub mod playback;
pub mod state;

pub use config::PlayerConfig;
pub use error::{Error, Result};
pub use playback::PlaybackController;
pub use state::{PlayerState, StateStore};

//! # Lullaby Common Library
//!
//! Shared vocabulary for the Lullaby playback control plane:
//! - Playback mode, slot and track identity types
//! - Event types (`PlayerEvent`) and the broadcast `EventBus`
//! - Fade curve definitions and gain interpolation
//! - Bootstrap configuration file resolution

pub mod config;
pub mod error;
pub mod events;
pub mod fade_curves;

pub use error::{Error, Result};
pub use events::{
    Direction, EventBus, PlaybackMode, PlayerEvent, ResumeStrategy, RollbackReason, SlotId,
    TrackHandle,
};
pub use fade_curves::FadeCurve;

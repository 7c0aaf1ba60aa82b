//! Playback-related type definitions
//!
//! Supporting types for playback mode, slot identity and crossfade lifecycle.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Playback mode enumeration
///
/// Exactly one value holds at any instant. Permitted transitions:
/// - `idle → preparing → playing`
/// - `preparing → paused`, `playing ↔ paused`
/// - `playing | paused → fadingOut → finished`
/// - any → `failed`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackMode {
    #[default]
    Idle,
    Preparing,
    Playing,
    Paused,
    FadingOut,
    Finished,
    Failed,
}

impl PlaybackMode {
    /// Whether `self → next` is a permitted transition
    pub fn can_transition_to(self, next: PlaybackMode) -> bool {
        use PlaybackMode::*;

        matches!(
            (self, next),
            (_, Failed)
                | (Idle, Preparing)
                | (Preparing, Playing)
                | (Preparing, Paused)
                | (Playing, Paused)
                | (Paused, Playing)
                | (Playing, FadingOut)
                | (Paused, FadingOut)
                | (FadingOut, Finished)
        )
    }

    /// Modes in which a track is loaded on the active slot
    pub fn has_audible_track(self) -> bool {
        matches!(
            self,
            PlaybackMode::Playing | PlaybackMode::Paused | PlaybackMode::FadingOut
        )
    }

    /// Terminal modes that require a reset before a new session can start
    pub fn is_terminal(self) -> bool {
        matches!(self, PlaybackMode::Finished | PlaybackMode::Failed)
    }
}

impl std::fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackMode::Idle => write!(f, "idle"),
            PlaybackMode::Preparing => write!(f, "preparing"),
            PlaybackMode::Playing => write!(f, "playing"),
            PlaybackMode::Paused => write!(f, "paused"),
            PlaybackMode::FadingOut => write!(f, "fadingOut"),
            PlaybackMode::Finished => write!(f, "finished"),
            PlaybackMode::Failed => write!(f, "failed"),
        }
    }
}

/// One of the two interchangeable player+mixer slots
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SlotId {
    A,
    B,
}

impl SlotId {
    /// Get the other slot
    pub fn other(self) -> Self {
        match self {
            SlotId::A => SlotId::B,
            SlotId::B => SlotId::A,
        }
    }

    /// Index into a fixed two-element slot array
    pub fn index(self) -> usize {
        match self {
            SlotId::A => 0,
            SlotId::B => 1,
        }
    }

    pub fn both() -> [SlotId; 2] {
        [SlotId::A, SlotId::B]
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotId::A => write!(f, "slot A"),
            SlotId::B => write!(f, "slot B"),
        }
    }
}

/// Opaque identity of a playable item
///
/// The locator is whatever the engine's `load` understands (path or URI).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TrackHandle {
    pub id: Uuid,
    pub locator: String,
}

impl TrackHandle {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            locator: locator.into(),
        }
    }
}

impl std::fmt::Display for TrackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.locator)
    }
}

/// Navigation direction through the playlist
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward"),
        }
    }
}

/// How a paused crossfade finishes once resumed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResumeStrategy {
    /// Ramp from the snapshotted gains over the remaining duration
    Continue,
    /// Collapse the remainder into a short fixed ramp
    QuickFinish,
}

/// Why a crossfade was rolled back instead of committed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RollbackReason {
    /// A newer command replaced the transition
    Superseded,
    /// Explicit cancel (stop)
    Cancelled,
    /// An engine step failed mid-transition
    EngineFailure,
    /// Ramps ended without verifiably reaching their targets
    Unverified,
}

impl std::fmt::Display for RollbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RollbackReason::Superseded => write!(f, "superseded"),
            RollbackReason::Cancelled => write!(f, "cancelled"),
            RollbackReason::EngineFailure => write!(f, "engine failure"),
            RollbackReason::Unverified => write!(f, "unverified"),
        }
    }
}

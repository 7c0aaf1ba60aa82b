//! Player commands
//!
//! Each public control-surface call becomes one `Command` executed by the
//! playback worker. Priority decides which pending commands a newcomer
//! discards; the interrupt decides what it asks of the running one.

use std::time::Duration;

use lullaby_common::Direction;

use crate::crossfade::Interrupt;

/// Queue priority; higher priorities discard lower pending ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CommandPriority {
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Begin a session on the playlist's current track
    Start { fade_in: Option<Duration> },
    Pause,
    Resume,
    /// Crossfade to the neighbouring playlist entry
    Skip(Direction),
    /// End the session, optionally fading out first
    Stop { fade_out: Option<Duration> },
    /// The active track is about to end
    TrackEnding,
}

impl Command {
    pub fn priority(&self) -> CommandPriority {
        match self {
            Command::Start { .. } | Command::Skip(_) | Command::TrackEnding => {
                CommandPriority::Normal
            }
            Command::Pause | Command::Resume => CommandPriority::High,
            Command::Stop { .. } => CommandPriority::Critical,
        }
    }

    /// Interrupt raised against the running command when this one is queued
    pub fn interrupt(&self) -> Option<Interrupt> {
        match self {
            Command::Pause => Some(Interrupt::Park),
            Command::Stop { .. } | Command::Skip(_) | Command::TrackEnding => Some(Interrupt::Abort),
            Command::Start { .. } | Command::Resume => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Command::Start { .. } => "start",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Skip(Direction::Forward) => "skip_to_next",
            Command::Skip(Direction::Backward) => "skip_to_previous",
            Command::Stop { .. } => "stop",
            Command::TrackEnding => "track_ending",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

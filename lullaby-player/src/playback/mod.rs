//! Playback control
//!
//! Command queue, playback orchestrator and the public controller handle,
//! plus the collaborator traits the orchestrator consumes.

mod collaborators;
mod commands;
mod controller;
mod player;
mod queue;

pub use collaborators::{
    InMemoryPlaylist, NoopSession, Playlist, RecordingSession, Session, SessionInterruption,
};
pub use commands::{Command, CommandPriority};
pub use controller::PlaybackController;
pub use player::PlayerCore;
pub use queue::{CommandQueue, QueuedCommand};

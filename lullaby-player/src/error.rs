//! Error types for lullaby-player
//!
//! Defines the control plane's error taxonomy using thiserror. Engine and
//! timeout failures are transient and may be retried by navigation commands;
//! everything else is surfaced to the caller as-is.

use std::time::Duration;

use lullaby_common::PlaybackMode;
use thiserror::Error;

/// Main error type for lullaby-player
#[derive(Error, Debug)]
pub enum Error {
    /// Command not valid in the current playback mode
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Mode change rejected by the state store; state left unchanged
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: PlaybackMode, to: PlaybackMode },

    /// Rendering engine reported a failure (decode, I/O, transport)
    #[error("Engine failure: {0}")]
    EngineFailure(String),

    /// Load did not complete within the adaptive deadline
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Command queue at capacity; rejected at admission
    #[error("Command queue full (depth {0})")]
    QueueFull(usize),

    /// Playlist exhausted or every candidate failed to load
    #[error("No valid target: {0}")]
    NoValidTarget(String),

    /// Queued command discarded before it started, or a transition aborted
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Invariant check failed; the offending mutation was reverted
    #[error("Inconsistent state: {0}")]
    Inconsistent(String),

    /// Configuration validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors from lullaby-common (config file loading)
    #[error(transparent)]
    Common(#[from] lullaby_common::Error),

    /// Controller worker has exited
    #[error("Player is shut down")]
    Shutdown,
}

impl Error {
    /// Failures callers see as "not valid right now"
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Error::InvalidState(_) | Error::InvalidTransition { .. })
    }

    /// Transient failures that navigation retries on another candidate
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::EngineFailure(_) | Error::Timeout(_))
    }
}

/// Convenience Result type using lullaby-player Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Error::EngineFailure("decode".into()).is_retryable());
        assert!(Error::Timeout(Duration::from_millis(500)).is_retryable());
        assert!(!Error::InvalidState("idle".into()).is_retryable());

        let transition = Error::InvalidTransition {
            from: PlaybackMode::Idle,
            to: PlaybackMode::Playing,
        };
        assert!(transition.is_invalid_state());
        assert_eq!(transition.to_string(), "Invalid transition: idle -> playing");
    }
}

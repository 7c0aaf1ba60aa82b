//! Event types for the Lullaby event system
//!
//! Provides the shared event definitions and the `EventBus` used by the
//! control plane to publish mode transitions and crossfade progress.

mod playback_types;

pub use playback_types::{Direction, PlaybackMode, ResumeStrategy, RollbackReason, SlotId, TrackHandle};

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Lullaby event types
///
/// Events are broadcast via `EventBus` and can be serialized for hosts that
/// forward them across a process boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Playback mode changed (committed by the state store)
    ModeChanged {
        /// Mode before change
        old_mode: PlaybackMode,
        /// Mode after change
        new_mode: PlaybackMode,
        /// When mode changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The audible track changed (start, or a committed crossfade)
    TrackChanged {
        track: TrackHandle,
        slot: SlotId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A crossfade entered its fading phase
    CrossfadeStarted {
        /// Outgoing track (None if nothing was loaded)
        from: Option<TrackHandle>,
        /// Incoming track
        to: TrackHandle,
        /// Requested overlap duration
        duration_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Crossfade progress update, emitted at a fixed cadence while fading
    ///
    /// Progress is monotonic within one transaction, 0.0 to 1.0.
    CrossfadeProgress {
        progress: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Crossfade paused; progress emission stops until resumed
    CrossfadePaused {
        progress: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Paused crossfade resumed
    CrossfadeResumed {
        progress: f32,
        strategy: ResumeStrategy,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Crossfade committed: the active slot flipped to the incoming track
    CrossfadeCommitted {
        track: TrackHandle,
        active_slot: SlotId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Crossfade aborted; the outgoing slot is the single audible slot again
    CrossfadeRolledBack {
        progress: f32,
        reason: RollbackReason,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A queued command began executing
    CommandStarted {
        sequence: u64,
        label: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A command settled (succeeded, failed or was cancelled)
    CommandSettled {
        sequence: u64,
        label: String,
        success: bool,
        /// Error message when `success` is false
        error: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlayerEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::ModeChanged { .. } => "ModeChanged",
            PlayerEvent::TrackChanged { .. } => "TrackChanged",
            PlayerEvent::CrossfadeStarted { .. } => "CrossfadeStarted",
            PlayerEvent::CrossfadeProgress { .. } => "CrossfadeProgress",
            PlayerEvent::CrossfadePaused { .. } => "CrossfadePaused",
            PlayerEvent::CrossfadeResumed { .. } => "CrossfadeResumed",
            PlayerEvent::CrossfadeCommitted { .. } => "CrossfadeCommitted",
            PlayerEvent::CrossfadeRolledBack { .. } => "CrossfadeRolledBack",
            PlayerEvent::CommandStarted { .. } => "CommandStarted",
            PlayerEvent::CommandSettled { .. } => "CommandSettled",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// Consumers that prefer a lazy sequence over a receiver use [`EventBus::stream`];
/// no callback list exists, so registration never contends with emission.
///
/// # Examples
///
/// ```
/// use lullaby_common::events::{EventBus, PlayerEvent, PlaybackMode};
///
/// let event_bus = EventBus::new(64);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(PlayerEvent::ModeChanged {
///     old_mode: PlaybackMode::Idle,
///     new_mode: PlaybackMode::Preparing,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before lagging subscribers
    ///   start losing the oldest ones
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Subscribe as a lazy stream
    ///
    /// Lagged gaps are skipped rather than surfaced; progress events are
    /// superseded by the next one anyway.
    pub fn stream(&self) -> impl Stream<Item = PlayerEvent> + Send + 'static {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|item| async move { item.ok() })
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

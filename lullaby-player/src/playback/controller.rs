//! Public control surface
//!
//! `PlaybackController` is the handle hosts hold. Every call becomes a queued
//! command; a single worker task owns the `PlayerCore` and executes them in
//! order, so no two command bodies ever overlap.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::Stream;
use lullaby_common::{Direction, EventBus, PlayerEvent};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::collaborators::{Playlist, Session, SessionInterruption};
use super::commands::Command;
use super::player::PlayerCore;
use super::queue::CommandQueue;
use crate::config::PlayerConfig;
use crate::engine::AudioEngine;
use crate::error::{Error, Result};
use crate::state::{PlayerState, StateStore, StoreSnapshot};

/// Cloneable handle to a running player
#[derive(Clone)]
pub struct PlaybackController {
    queue: Arc<CommandQueue>,
    store: Arc<StateStore>,
    events: EventBus,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl PlaybackController {
    /// Validate `config` and spawn the playback worker
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        config: PlayerConfig,
        engine: Arc<dyn AudioEngine>,
        playlist: Box<dyn Playlist>,
        session: Arc<dyn Session>,
    ) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new(config.event_capacity);
        let store = Arc::new(StateStore::new(events.clone()));
        let queue = Arc::new(CommandQueue::new(config.queue_depth));

        let core = PlayerCore::new(
            config,
            engine,
            Arc::clone(&store),
            events.clone(),
            playlist,
            session,
            queue.interrupts(),
        );
        let worker = tokio::spawn(run_worker(core, Arc::clone(&queue), events.clone()));
        info!("Playback worker started");

        Ok(Self {
            queue,
            store,
            events,
            worker: Arc::new(Mutex::new(Some(worker))),
        })
    }

    async fn submit(&self, command: Command) -> Result<()> {
        let (_, settled) = self.queue.submit(command)?;
        settled.await.map_err(|_| Error::Shutdown)?
    }

    /// Start playback of the playlist's current track
    pub async fn start(&self, fade_in: Option<Duration>) -> Result<()> {
        self.submit(Command::Start { fade_in }).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.submit(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.submit(Command::Resume).await
    }

    pub async fn skip_to_next(&self) -> Result<()> {
        self.submit(Command::Skip(Direction::Forward)).await
    }

    pub async fn skip_to_previous(&self) -> Result<()> {
        self.submit(Command::Skip(Direction::Backward)).await
    }

    /// Stop playback, cancelling queued and in-flight work
    pub async fn stop(&self, fade_out: Option<Duration>) -> Result<()> {
        self.submit(Command::Stop { fade_out }).await
    }

    /// Host notification that the active track is about to end
    pub async fn track_ending(&self) -> Result<()> {
        self.submit(Command::TrackEnding).await
    }

    /// Translate an audio session interruption into pause/resume
    pub async fn handle_interruption(&self, interruption: SessionInterruption) -> Result<()> {
        match interruption {
            SessionInterruption::Began => self.pause().await,
            SessionInterruption::Ended { should_resume: true } => self.resume().await,
            SessionInterruption::Ended { should_resume: false } => {
                debug!("Interruption ended without resume");
                Ok(())
            }
        }
    }

    pub fn state(&self) -> PlayerState {
        self.store.state()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    /// Lazy event stream
    pub fn events(&self) -> impl Stream<Item = PlayerEvent> + Send + 'static {
        self.events.stream()
    }

    /// Commands waiting behind the running one
    pub fn pending_commands(&self) -> usize {
        self.queue.len()
    }

    /// Cancel pending commands, let the running one settle and stop the worker
    pub async fn shutdown(&self) {
        self.queue.close();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!("Playback worker panicked: {}", e);
            }
        }
    }
}

/// Closes the queue when the worker exits, including by panic, so callers
/// get `Shutdown` instead of waiting on a reply that never comes
struct CloseOnExit(Arc<CommandQueue>);

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        self.0.close();
    }
}

async fn run_worker(mut core: PlayerCore, queue: Arc<CommandQueue>, events: EventBus) {
    let _guard = CloseOnExit(Arc::clone(&queue));
    while let Some(queued) = queue.next().await {
        let sequence = queued.sequence;
        let label = queued.command.label();
        debug!(
            "Command #{} {} waited {:?}",
            sequence,
            label,
            queued.enqueued_at.elapsed()
        );
        info!("Command #{} {} started", sequence, label);
        events.emit_lossy(PlayerEvent::CommandStarted {
            sequence,
            label: label.to_string(),
            timestamp: chrono::Utc::now(),
        });

        let result = core.execute(queued.command).await;
        match &result {
            Ok(()) => info!("Command #{} {} succeeded", sequence, label),
            Err(e @ (Error::Cancelled(_) | Error::InvalidState(_) | Error::InvalidTransition { .. })) => {
                warn!("Command #{} {} did not run to completion: {}", sequence, label, e)
            }
            Err(e) => error!("Command #{} {} failed: {}", sequence, label, e),
        }

        queue.settle(sequence);
        events.emit_lossy(PlayerEvent::CommandSettled {
            sequence,
            label: label.to_string(),
            success: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
            timestamp: chrono::Utc::now(),
        });
        let _ = queued.reply.send(result);
    }
    info!("Playback worker stopped");
}

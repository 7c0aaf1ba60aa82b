//! External collaborators
//!
//! The playback orchestrator consumes a playlist (navigation) and an audio
//! session (OS lifecycle). Both are traits so hosts supply their own; the
//! in-memory implementations here back the binary and the tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use lullaby_common::{Direction, TrackHandle};
use tracing::debug;

use crate::error::Result;

/// Playlist navigation
///
/// `peek` never mutates; `commit` moves the index and is only called after
/// the corresponding load succeeded. `peek(_, 0)` is the current entry.
pub trait Playlist: Send + Sync {
    fn current(&self) -> Option<TrackHandle> {
        self.peek(Direction::Forward, 0)
    }

    /// Entry `steps` away from the current one
    fn peek(&self, direction: Direction, steps: usize) -> Option<TrackHandle>;

    fn peek_next(&self) -> Option<TrackHandle> {
        self.peek(Direction::Forward, 1)
    }

    fn peek_previous(&self) -> Option<TrackHandle> {
        self.peek(Direction::Backward, 1)
    }

    /// Move the index `steps` entries; false if out of range
    fn commit(&mut self, direction: Direction, steps: usize) -> bool;

    fn advance(&mut self) -> bool {
        self.commit(Direction::Forward, 1)
    }

    fn retreat(&mut self) -> bool {
        self.commit(Direction::Backward, 1)
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
struct PlaylistState {
    tracks: Vec<TrackHandle>,
    index: usize,
    looping: bool,
    /// Index after every commit, oldest first
    history: Vec<usize>,
}

impl PlaylistState {
    fn resolve(&self, direction: Direction, steps: usize) -> Option<usize> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }
        let index = self.index as isize;
        let offset = match direction {
            Direction::Forward => steps as isize,
            Direction::Backward => -(steps as isize),
        };
        let target = index + offset;

        if (0..len as isize).contains(&target) {
            Some(target as usize)
        } else if self.looping {
            Some(target.rem_euclid(len as isize) as usize)
        } else {
            None
        }
    }
}

/// Shared in-memory playlist
///
/// Clones share state, so a test can observe the index while the player
/// owns another clone.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPlaylist {
    state: Arc<Mutex<PlaylistState>>,
}

impl InMemoryPlaylist {
    pub fn new(tracks: Vec<TrackHandle>) -> Self {
        Self {
            state: Arc::new(Mutex::new(PlaylistState {
                tracks,
                ..Default::default()
            })),
        }
    }

    /// Build from locators
    pub fn from_locators<I, S>(locators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(locators.into_iter().map(TrackHandle::new).collect())
    }

    /// Wrap around at both ends
    pub fn looping(self, looping: bool) -> Self {
        self.lock().looping = looping;
        self
    }

    fn lock(&self) -> MutexGuard<'_, PlaylistState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn index(&self) -> usize {
        self.lock().index
    }

    pub fn history(&self) -> Vec<usize> {
        self.lock().history.clone()
    }
}

impl Playlist for InMemoryPlaylist {
    fn peek(&self, direction: Direction, steps: usize) -> Option<TrackHandle> {
        let state = self.lock();
        state
            .resolve(direction, steps)
            .map(|index| state.tracks[index].clone())
    }

    fn commit(&mut self, direction: Direction, steps: usize) -> bool {
        let mut state = self.lock();
        match state.resolve(direction, steps) {
            Some(index) => {
                debug!("Playlist index {} -> {}", state.index, index);
                state.index = index;
                state.history.push(index);
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.lock().tracks.len()
    }
}

/// OS audio session bracketing a playback session
///
/// Both calls must be idempotent.
#[async_trait]
pub trait Session: Send + Sync {
    async fn activate(&self) -> Result<()>;
    async fn deactivate(&self) -> Result<()>;
}

/// Session for hosts without an OS audio session
#[derive(Debug, Default)]
pub struct NoopSession;

#[async_trait]
impl Session for NoopSession {
    async fn activate(&self) -> Result<()> {
        Ok(())
    }

    async fn deactivate(&self) -> Result<()> {
        Ok(())
    }
}

/// Session that counts real state changes
#[derive(Debug, Default)]
pub struct RecordingSession {
    active: AtomicBool,
    activations: AtomicUsize,
    deactivations: AtomicUsize,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    pub fn deactivations(&self) -> usize {
        self.deactivations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Session for RecordingSession {
    async fn activate(&self) -> Result<()> {
        if !self.active.swap(true, Ordering::SeqCst) {
            self.activations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn deactivate(&self) -> Result<()> {
        if self.active.swap(false, Ordering::SeqCst) {
            self.deactivations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// OS notification that another app took or released audio focus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInterruption {
    Began,
    Ended { should_resume: bool },
}

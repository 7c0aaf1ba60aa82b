//! Player fixtures
//!
//! `PlayerBuilder` wires a `PlaybackController` to a `SimulatedEngine`, an
//! `InMemoryPlaylist` and a `RecordingSession`, keeping inspection handles
//! to all three. Durations are short so paused-clock tests stay readable.

use std::sync::Arc;
use std::time::Duration;

use lullaby_common::{FadeCurve, PlaybackMode, SlotId};
use lullaby_player::engine::SimulatedEngine;
use lullaby_player::playback::{InMemoryPlaylist, RecordingSession};
use lullaby_player::{PlaybackController, PlayerConfig, Result};
use tokio::task::JoinHandle;

use super::event_log::EventLog;

/// Crossfade 1 s, rollback 100 ms, quick-finish 200 ms, load deadline 500 ms
pub fn test_config() -> PlayerConfig {
    let mut config = PlayerConfig::default();
    config.crossfade.duration_ms = 1000;
    config.crossfade.curve = FadeCurve::Linear;
    config.crossfade.progress_interval_ms = 50;
    config.crossfade.rollback_ms = 100;
    config.crossfade.quick_finish_ms = 200;
    config.load_timeout.initial_ms = 500;
    config.load_timeout.min_ms = 100;
    config.load_timeout.max_ms = 2000;
    config
}

pub struct PlayerBuilder {
    config: PlayerConfig,
    tracks: Vec<String>,
    looping: bool,
    failing: Vec<String>,
    stalling: Vec<String>,
}

impl PlayerBuilder {
    pub fn new<I, S>(tracks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            config: test_config(),
            tracks: tracks.into_iter().map(Into::into).collect(),
            looping: false,
            failing: Vec::new(),
            stalling: Vec::new(),
        }
    }

    pub fn configure(mut self, f: impl FnOnce(&mut PlayerConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    /// Loads of locators containing `pattern` fail
    pub fn failing(mut self, pattern: &str) -> Self {
        self.failing.push(pattern.to_string());
        self
    }

    /// Loads of locators containing `pattern` never complete
    pub fn stalling(mut self, pattern: &str) -> Self {
        self.stalling.push(pattern.to_string());
        self
    }

    /// Spawn the controller; must run inside a tokio runtime
    pub fn build(self) -> TestPlayer {
        let engine = SimulatedEngine::new();
        for pattern in self.failing {
            engine.fail_locator(pattern);
        }
        for pattern in self.stalling {
            engine.stall_locator(pattern);
        }

        let playlist = InMemoryPlaylist::from_locators(self.tracks).looping(self.looping);
        let session = Arc::new(RecordingSession::new());

        let controller = PlaybackController::spawn(
            self.config,
            Arc::new(engine.clone()),
            Box::new(playlist.clone()),
            Arc::clone(&session) as _,
        )
        .expect("test config is valid");
        let log = EventLog::new(controller.subscribe());

        TestPlayer {
            controller,
            engine,
            playlist,
            session,
            log,
        }
    }
}

pub struct TestPlayer {
    pub controller: PlaybackController,
    pub engine: SimulatedEngine,
    pub playlist: InMemoryPlaylist,
    pub session: Arc<RecordingSession>,
    pub log: EventLog,
}

impl TestPlayer {
    /// Build and start playback without a fade-in
    pub async fn playing<I, S>(tracks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let player = PlayerBuilder::new(tracks).build();
        player.controller.start(None).await.expect("start succeeds");
        player
    }

    pub fn mode(&self) -> PlaybackMode {
        self.controller.state().mode
    }

    pub fn active_locator(&self) -> Option<String> {
        self.controller
            .state()
            .active_track
            .map(|track| track.locator)
    }

    pub fn active_slot(&self) -> SlotId {
        self.controller.snapshot().active
    }

    /// Run `skip_to_next` in the background so the test can interleave commands
    pub fn spawn_skip(&self) -> JoinHandle<Result<()>> {
        let controller = self.controller.clone();
        tokio::spawn(async move { controller.skip_to_next().await })
    }
}

/// Sleep on the (usually paused) tokio clock
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

//! Playback orchestrator
//!
//! Executes one command at a time on behalf of the playback worker. Reads the
//! state store, decides the plan (direct engine calls or a crossfade) and
//! commits the resulting state. Never runs concurrently with itself: the
//! worker owns the only instance.

use std::sync::Arc;
use std::time::Duration;

use lullaby_common::{
    Direction, EventBus, PlaybackMode, PlayerEvent, RollbackReason, SlotId, TrackHandle,
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::collaborators::{Playlist, Session};
use super::commands::Command;
use crate::config::PlayerConfig;
use crate::crossfade::{CrossfadeOrchestrator, CrossfadePhase, FadeOutcome, Interrupt, NavigationTag};
use crate::engine::AudioEngine;
use crate::error::{Error, Result};
use crate::state::StateStore;

/// Resolves once any interrupt is raised
async fn interrupt_raised(interrupts: &mut watch::Receiver<Option<Interrupt>>) {
    loop {
        if interrupts.borrow_and_update().is_some() {
            return;
        }
        if interrupts.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub struct PlayerCore {
    config: PlayerConfig,
    engine: Arc<dyn AudioEngine>,
    store: Arc<StateStore>,
    events: EventBus,
    crossfade: CrossfadeOrchestrator,
    playlist: Box<dyn Playlist>,
    session: Arc<dyn Session>,
    interrupts: watch::Receiver<Option<Interrupt>>,
}

impl PlayerCore {
    pub fn new(
        config: PlayerConfig,
        engine: Arc<dyn AudioEngine>,
        store: Arc<StateStore>,
        events: EventBus,
        playlist: Box<dyn Playlist>,
        session: Arc<dyn Session>,
        interrupts: watch::Receiver<Option<Interrupt>>,
    ) -> Self {
        let crossfade =
            CrossfadeOrchestrator::new(Arc::clone(&engine), Arc::clone(&store), events.clone(), &config);
        Self {
            config,
            engine,
            store,
            events,
            crossfade,
            playlist,
            session,
            interrupts,
        }
    }

    pub async fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Start { fade_in } => self.start(fade_in).await,
            Command::Pause => self.pause().await,
            Command::Resume => self.resume().await,
            Command::Skip(direction) => {
                let duration = self.config.crossfade.duration();
                self.run_crossfade(direction, duration).await
            }
            Command::Stop { fade_out } => self.stop(fade_out).await,
            Command::TrackEnding => self.track_ending().await,
        }
    }

    // ========================================
    // start
    // ========================================

    async fn start(&mut self, fade_in: Option<Duration>) -> Result<()> {
        let mode = self.store.mode();
        if mode.is_terminal() {
            self.store.reset()?;
        } else if mode != PlaybackMode::Idle {
            return Err(Error::InvalidState(format!(
                "start requires idle, mode is {}",
                mode
            )));
        }
        if self.playlist.is_empty() {
            return Err(Error::NoValidTarget("playlist is empty".into()));
        }

        let baseline = self.store.capture_snapshot();
        self.session.activate().await?;
        self.store.set_mode(PlaybackMode::Preparing)?;
        let slot = self.store.active_slot();

        let (track, steps) = match self.load_candidate(Direction::Forward, 0, slot).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Start found no playable track: {}", e);
                self.store.restore_snapshot(baseline)?;
                self.deactivate_session().await;
                return Err(e);
            }
        };
        if steps > 0 {
            self.playlist.commit(Direction::Forward, steps);
        }

        if let Err(e) = self.begin_playback(track.clone(), slot, fade_in).await {
            error!("Start failed after loading {}: {}", track, e);
            self.halt_slots().await;
            if let Err(e) = self.store.set_mode(PlaybackMode::Failed) {
                error!("Could not record failure: {}", e);
            }
            self.deactivate_session().await;
            return Err(e);
        }

        self.events.emit_lossy(PlayerEvent::TrackChanged {
            track,
            slot,
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    /// First loadable entry starting `first_step` away from the current one
    ///
    /// Transient failures move on to the next entry; the playlist index is
    /// left alone so the caller commits only what actually loaded.
    async fn load_candidate(
        &mut self,
        direction: Direction,
        first_step: usize,
        slot: SlotId,
    ) -> Result<(TrackHandle, usize)> {
        let attempts = self.config.navigation_attempts;
        let mut failures = 0;

        for step in first_step..first_step + attempts {
            let Some(track) = self.playlist.peek(direction, step) else {
                break;
            };
            match self.crossfade.load_bounded(&track, slot).await {
                Ok(_) => return Ok((track, step)),
                Err(e) if e.is_retryable() => {
                    warn!("Candidate {} unusable ({}), trying the next one", track, e);
                    failures += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::NoValidTarget(format!(
            "no playable track {} after {} failed attempt(s)",
            direction, failures
        )))
    }

    async fn begin_playback(
        &mut self,
        track: TrackHandle,
        slot: SlotId,
        fade_in: Option<Duration>,
    ) -> Result<()> {
        self.store.load_track(track.clone(), slot)?;

        let fade_in = fade_in.filter(|duration| !duration.is_zero());
        let initial_gain = if fade_in.is_some() { 0.0 } else { 1.0 };
        self.engine.set_gain(slot, initial_gain).await?;
        self.engine.play(slot).await?;

        if let Some(duration) = fade_in {
            self.fade_in(slot, duration).await?;
        }

        self.store.update_mixer_levels(1.0, 0.0)?;
        self.store.set_mode(PlaybackMode::Playing)?;
        info!("Playing {} on {}", track, slot);
        Ok(())
    }

    /// Single-slot fade-in, cut to full gain if another command is waiting
    async fn fade_in(&mut self, slot: SlotId, duration: Duration) -> Result<()> {
        let mut ramp = self
            .engine
            .ramp_gain(slot, 0.0, 1.0, duration, self.config.crossfade.curve)
            .await?;

        let interrupted = tokio::select! {
            _ = ramp.wait() => false,
            _ = interrupt_raised(&mut self.interrupts) => true,
        };

        if interrupted || !ramp.is_finished() {
            debug!("Fade-in on {} cut short", slot);
            ramp.cancel();
            self.engine.set_gain(slot, 1.0).await?;
        }
        Ok(())
    }

    // ========================================
    // pause / resume
    // ========================================

    async fn pause(&mut self) -> Result<()> {
        let mode = self.store.mode();
        match mode {
            PlaybackMode::Paused => {
                debug!("Pause while paused: nothing to do");
                return Ok(());
            }
            PlaybackMode::Playing | PlaybackMode::Preparing => {}
            _ => return Err(Error::InvalidState(format!("cannot pause while {}", mode))),
        }

        if self.crossfade.has_transaction() {
            self.crossfade.pause().await?;
        }

        // Both slots, whichever is audible
        futures::future::try_join(self.engine.pause(SlotId::A), self.engine.pause(SlotId::B))
            .await?;
        self.store.set_mode(PlaybackMode::Paused)
    }

    async fn resume(&mut self) -> Result<()> {
        let mode = self.store.mode();
        match mode {
            PlaybackMode::Playing => {
                debug!("Resume while playing: nothing to do");
                return Ok(());
            }
            PlaybackMode::Paused => {}
            _ => return Err(Error::InvalidState(format!("cannot resume while {}", mode))),
        }

        if self.crossfade.phase() == CrossfadePhase::Paused {
            self.crossfade.resume().await?;
            self.store.set_mode(PlaybackMode::Playing)?;

            return match self.crossfade.drive(&mut self.interrupts).await? {
                FadeOutcome::RolledBack => {
                    info!("Resumed crossfade was superseded");
                    Ok(())
                }
                outcome => self.settle_outcome(outcome),
            };
        }

        let slot = self.store.active_slot();
        self.engine.play(slot).await?;
        self.store.set_mode(PlaybackMode::Playing)
    }

    // ========================================
    // navigation
    // ========================================

    /// Crossfade to the first loadable entry in `direction`
    async fn run_crossfade(&mut self, direction: Direction, duration: Duration) -> Result<()> {
        let mode = self.store.mode();
        if !matches!(mode, PlaybackMode::Playing | PlaybackMode::Paused) {
            return Err(Error::InvalidState(format!(
                "cannot navigate {} while {}",
                direction, mode
            )));
        }

        if self.crossfade.has_transaction() {
            info!("Rolling back the current crossfade before moving {}", direction);
            self.crossfade.rollback(RollbackReason::Superseded).await?;
        }

        let curve = self.config.crossfade.curve;
        let attempts = self.config.navigation_attempts;
        let mut failures = 0;
        let mut prepared = false;

        for step in 1..=attempts {
            let Some(target) = self.playlist.peek(direction, step) else {
                break;
            };
            let tag = NavigationTag { direction, steps: step };

            match self.crossfade.prepare(target.clone(), duration, curve, Some(tag)).await {
                Ok(()) => {
                    prepared = true;
                    break;
                }
                Err(e) if e.is_retryable() => {
                    warn!("Candidate {} unusable ({}), trying the next one", target, e);
                    failures += 1;
                }
                Err(e) => return Err(e),
            }
        }

        if !prepared {
            return Err(Error::NoValidTarget(format!(
                "no playable track {} after {} failed attempt(s)",
                direction, failures
            )));
        }

        let outcome = if mode == PlaybackMode::Paused {
            self.crossfade.cut_over().await?
        } else {
            self.crossfade.start_fade().await?;
            self.crossfade.drive(&mut self.interrupts).await?
        };
        self.settle_outcome(outcome)
    }

    fn settle_outcome(&mut self, outcome: FadeOutcome) -> Result<()> {
        match outcome {
            FadeOutcome::Committed { target, tag } => {
                if let Some(tag) = tag {
                    if !self.playlist.commit(tag.direction, tag.steps) {
                        warn!("Playlist rejected move {:?}", tag);
                    }
                }
                self.events.emit_lossy(PlayerEvent::TrackChanged {
                    track: target,
                    slot: self.store.active_slot(),
                    timestamp: chrono::Utc::now(),
                });
                Ok(())
            }
            FadeOutcome::Parked => Ok(()),
            FadeOutcome::RolledBack => Err(Error::Cancelled(
                "crossfade superseded by a newer command".into(),
            )),
        }
    }

    async fn track_ending(&mut self) -> Result<()> {
        let mode = self.store.mode();
        if mode != PlaybackMode::Playing {
            return Err(Error::InvalidState(format!("track ending while {}", mode)));
        }

        let duration = self.config.crossfade.duration();
        if self.playlist.peek_next().is_some() {
            return self.run_crossfade(Direction::Forward, duration).await;
        }

        info!("Playlist exhausted, fading out");
        self.crossfade.rollback(RollbackReason::Superseded).await?;
        self.wind_down(Some(duration)).await
    }

    // ========================================
    // stop
    // ========================================

    async fn stop(&mut self, fade_out: Option<Duration>) -> Result<()> {
        let mode = self.store.mode();
        match mode {
            PlaybackMode::Idle | PlaybackMode::Finished => {
                debug!("Stop while {}: nothing to do", mode);
                return Ok(());
            }
            PlaybackMode::Failed => {
                self.crossfade.rollback(RollbackReason::Cancelled).await?;
                self.halt_slots().await;
                self.release_slots();
                self.deactivate_session().await;
                return Ok(());
            }
            PlaybackMode::Playing | PlaybackMode::Paused => {}
            _ => return Err(Error::InvalidState(format!("cannot stop while {}", mode))),
        }

        self.crossfade.rollback(RollbackReason::Cancelled).await?;
        self.wind_down(fade_out).await
    }

    /// playing | paused -> fadingOut -> finished
    async fn wind_down(&mut self, fade_out: Option<Duration>) -> Result<()> {
        let was_playing = self.store.mode() == PlaybackMode::Playing;
        self.store.set_mode(PlaybackMode::FadingOut)?;

        let slot = self.store.active_slot();
        if let Some(duration) = fade_out.filter(|d| was_playing && !d.is_zero()) {
            if let Err(e) = self.fade_out(slot, duration).await {
                warn!("Fade-out on {} failed: {}", slot, e);
            }
        }

        self.halt_slots().await;
        self.store.set_mode(PlaybackMode::Finished)?;
        self.release_slots();
        self.deactivate_session().await;
        info!("Playback finished");
        Ok(())
    }

    /// Single-slot fade to silence, cut short if another command is waiting
    async fn fade_out(&mut self, slot: SlotId, duration: Duration) -> Result<()> {
        let from = self.engine.current_gain(slot).await;
        let mut ramp = self
            .engine
            .ramp_gain(slot, from, 0.0, duration, self.config.crossfade.curve)
            .await?;

        let interrupted = tokio::select! {
            _ = ramp.wait() => false,
            _ = interrupt_raised(&mut self.interrupts) => true,
        };

        if interrupted {
            debug!("Fade-out on {} cut short", slot);
            ramp.cancel();
        }
        Ok(())
    }

    async fn halt_slots(&self) {
        for slot in SlotId::both() {
            if let Err(e) = self.engine.stop(slot).await {
                warn!("Failed to stop {}: {}", slot, e);
            }
        }
    }

    fn release_slots(&self) {
        for slot in SlotId::both() {
            if let Err(e) = self.store.release_slot(slot) {
                warn!("Failed to release {}: {}", slot, e);
            }
        }
    }

    async fn deactivate_session(&self) {
        if let Err(e) = self.session.deactivate().await {
            warn!("Session deactivation failed: {}", e);
        }
    }
}

//! Crossfade orchestrator
//!
//! Owns the single `CrossfadeTransaction` and drives it through the engine
//! port. Every failure path rolls back before the error propagates, so the
//! outgoing slot is always left as the single audible slot unless a commit
//! completed.

use std::sync::Arc;
use std::time::Duration;

use lullaby_common::{
    EventBus, FadeCurve, PlaybackMode, PlayerEvent, ResumeStrategy, RollbackReason, SlotId,
    TrackHandle,
};
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::transaction::RampPair;
use super::{
    AdaptiveTimeout, CrossfadePhase, CrossfadeTransaction, Interrupt, NavigationTag,
    PauseSnapshot,
};
use crate::config::{CrossfadeConfig, PlayerConfig};
use crate::engine::AudioEngine;
use crate::error::{Error, Result};
use crate::state::StateStore;

/// Distance from a ramp target still accepted as "reached"
const GAIN_TOLERANCE: f32 = 0.01;

/// How a driven crossfade ended
#[derive(Debug, Clone, PartialEq)]
pub enum FadeOutcome {
    /// Slots swapped; `tag` is the playlist move to commit
    Committed {
        target: TrackHandle,
        tag: Option<NavigationTag>,
    },
    /// Paused by a pause request; the transaction is kept
    Parked,
    /// Aborted by a superseding command
    RolledBack,
}

enum DriveStep {
    Tick,
    RampsDone,
    Interrupted,
    InterruptsClosed,
}

/// Pick the resume strategy for a paused crossfade
///
/// Quick-finish is the baseline; continuing is only used when enabled, the
/// fade is not nearly done and more than the quick-finish allowance remains.
pub fn resume_strategy(
    config: &CrossfadeConfig,
    progress: f32,
    remaining: Duration,
) -> ResumeStrategy {
    if config.continue_resume
        && progress < config.quick_finish_threshold
        && remaining > config.quick_finish()
    {
        ResumeStrategy::Continue
    } else {
        ResumeStrategy::QuickFinish
    }
}

pub struct CrossfadeOrchestrator {
    engine: Arc<dyn AudioEngine>,
    store: Arc<StateStore>,
    events: EventBus,
    config: CrossfadeConfig,
    timeout: AdaptiveTimeout,
    phase: CrossfadePhase,
    transaction: Option<CrossfadeTransaction>,
}

impl CrossfadeOrchestrator {
    pub fn new(
        engine: Arc<dyn AudioEngine>,
        store: Arc<StateStore>,
        events: EventBus,
        config: &PlayerConfig,
    ) -> Self {
        Self {
            engine,
            store,
            events,
            config: config.crossfade.clone(),
            timeout: AdaptiveTimeout::new(&config.load_timeout),
            phase: CrossfadePhase::Idle,
            transaction: None,
        }
    }

    pub fn phase(&self) -> CrossfadePhase {
        self.phase
    }

    pub fn has_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    pub fn transaction(&self) -> Option<&CrossfadeTransaction> {
        self.transaction.as_ref()
    }

    /// Load `track` onto `slot` within the adaptive deadline
    pub async fn load_bounded(&mut self, track: &TrackHandle, slot: SlotId) -> Result<Duration> {
        let deadline = self.timeout.deadline();
        let started = Instant::now();

        match time::timeout(deadline, self.engine.load(track, slot)).await {
            Ok(Ok(length)) => {
                self.timeout.record_success(started.elapsed());
                debug!(
                    "Loaded {} on {} in {:?} (next deadline {:?})",
                    track,
                    slot,
                    started.elapsed(),
                    self.timeout.deadline()
                );
                Ok(length)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                self.timeout.record_timeout();
                warn!("Loading {} on {} exceeded {:?}", track, slot, deadline);
                Err(Error::Timeout(deadline))
            }
        }
    }

    /// idle -> preparing: stage `target` on the inactive slot
    ///
    /// On failure the orchestrator returns to idle and identity is untouched.
    pub async fn prepare(
        &mut self,
        target: TrackHandle,
        duration: Duration,
        curve: FadeCurve,
        tag: Option<NavigationTag>,
    ) -> Result<()> {
        if self.transaction.is_some() {
            return Err(Error::InvalidState(format!(
                "crossfade already in progress ({})",
                self.phase
            )));
        }

        let snapshot = self.store.snapshot();
        if !matches!(snapshot.mode, PlaybackMode::Playing | PlaybackMode::Paused) {
            return Err(Error::InvalidState(format!(
                "cannot crossfade while {}",
                snapshot.mode
            )));
        }

        let outgoing = snapshot.active;
        let incoming = outgoing.other();
        self.phase = CrossfadePhase::Preparing;
        info!(
            "Preparing crossfade to {} on {} ({} ms)",
            target,
            incoming,
            duration.as_millis()
        );

        if let Err(e) = self.stage_incoming(&target, incoming).await {
            warn!("Crossfade preparation for {} failed: {}", target, e);
            self.discard_incoming(incoming).await;
            self.phase = CrossfadePhase::Idle;
            return Err(e);
        }

        self.transaction = Some(CrossfadeTransaction::new(
            snapshot.active_track().cloned(),
            target,
            outgoing,
            duration,
            curve,
            tag,
        ));
        Ok(())
    }

    async fn stage_incoming(&mut self, target: &TrackHandle, incoming: SlotId) -> Result<()> {
        self.load_bounded(target, incoming).await?;
        self.store.load_track(target.clone(), incoming)?;
        self.store.set_crossfading(true)?;
        Ok(())
    }

    async fn discard_incoming(&self, incoming: SlotId) {
        if let Err(e) = self.engine.stop(incoming).await {
            debug!("Stopping {} after failed preparation: {}", incoming, e);
        }
        if let Err(e) = self.store.release_slot(incoming) {
            warn!("Could not release {}: {}", incoming, e);
        }
        if self.store.is_crossfading() {
            if let Err(e) = self.store.set_crossfading(false) {
                warn!("Could not clear crossfade flag: {}", e);
            }
        }
    }

    /// preparing -> fading: start both slots and both ramps
    pub async fn start_fade(&mut self) -> Result<()> {
        if self.transaction.is_none() || self.phase != CrossfadePhase::Preparing {
            return Err(Error::InvalidState(format!(
                "cannot start a fade while {}",
                self.phase
            )));
        }

        if let Err(e) = self.begin_fade().await {
            warn!("Crossfade start failed: {}", e);
            self.rollback(RollbackReason::EngineFailure).await?;
            return Err(e);
        }
        Ok(())
    }

    async fn begin_fade(&mut self) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        let tx = self
            .transaction
            .as_mut()
            .ok_or_else(|| Error::InvalidState("no crossfade prepared".into()))?;
        let (outgoing, incoming) = (tx.outgoing, tx.incoming);

        engine.set_gain(incoming, 0.0).await?;
        let from = engine.current_gain(outgoing).await;
        engine.synchronized_start(outgoing, incoming).await?;

        let ramps = RampPair {
            outgoing: engine
                .ramp_gain(outgoing, from, 0.0, tx.duration, tx.curve)
                .await?,
            incoming: engine
                .ramp_gain(incoming, 0.0, 1.0, tx.duration, tx.curve)
                .await?,
        };
        tx.begin_segment(ramps);

        info!("Crossfade {} started: {} -> {}", tx.id, outgoing, incoming);
        let event = PlayerEvent::CrossfadeStarted {
            from: tx.source.clone(),
            to: tx.target.clone(),
            duration_ms: tx.duration.as_millis() as u64,
            timestamp: chrono::Utc::now(),
        };
        self.phase = CrossfadePhase::Fading;
        self.events.emit_lossy(event);
        Ok(())
    }

    /// Commit a prepared crossfade without fading
    ///
    /// Used while playback is paused: nothing is audible, so the slots are
    /// switched with instant gains and the incoming slot stays stopped.
    pub async fn cut_over(&mut self) -> Result<FadeOutcome> {
        let (outgoing, incoming) = match (&self.transaction, self.phase) {
            (Some(tx), CrossfadePhase::Preparing) => (tx.outgoing, tx.incoming),
            _ => {
                return Err(Error::InvalidState(format!(
                    "cannot cut over while {}",
                    self.phase
                )))
            }
        };

        if let Err(e) = self.set_gains(outgoing, 0.0, incoming, 1.0).await {
            warn!("Cut-over failed: {}", e);
            self.rollback(RollbackReason::EngineFailure).await?;
            return Err(e);
        }

        self.phase = CrossfadePhase::Committing;
        self.finish_commit().await
    }

    /// Run the fading phase until commit or interruption
    ///
    /// Selects over the progress tick, completion of both ramps and the
    /// interrupt channel. A `Park` pauses the crossfade and returns
    /// `Parked`; an `Abort` rolls it back and returns `RolledBack`.
    pub async fn drive(
        &mut self,
        interrupts: &mut watch::Receiver<Option<Interrupt>>,
    ) -> Result<FadeOutcome> {
        if self.phase != CrossfadePhase::Fading {
            return Err(Error::InvalidState(format!(
                "cannot drive a crossfade while {}",
                self.phase
            )));
        }

        let mut ticker = time::interval(self.config.progress_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut interrupts_open = true;

        loop {
            let pending = *interrupts.borrow_and_update();
            if let Some(kind) = pending {
                return self.interrupt(kind).await;
            }

            let mut ramps = self
                .transaction
                .as_ref()
                .and_then(|tx| tx.ramps().cloned())
                .ok_or_else(|| Error::Inconsistent("fading without ramps".into()))?;

            let step = tokio::select! {
                biased;

                changed = interrupts.changed(), if interrupts_open => match changed {
                    Ok(()) => DriveStep::Interrupted,
                    Err(_) => DriveStep::InterruptsClosed,
                },
                _ = ramps.wait() => DriveStep::RampsDone,
                _ = ticker.tick() => DriveStep::Tick,
            };

            match step {
                DriveStep::Tick => self.publish_progress(),
                DriveStep::RampsDone => return self.commit().await,
                DriveStep::Interrupted => {}
                DriveStep::InterruptsClosed => interrupts_open = false,
            }
        }
    }

    async fn interrupt(&mut self, kind: Interrupt) -> Result<FadeOutcome> {
        match kind {
            Interrupt::Park => {
                info!("Crossfade parked by pause request");
                self.pause().await?;
                Ok(FadeOutcome::Parked)
            }
            Interrupt::Abort => {
                self.rollback(RollbackReason::Superseded).await?;
                Ok(FadeOutcome::RolledBack)
            }
        }
    }

    fn publish_progress(&mut self) {
        let Some(tx) = self.transaction.as_mut() else {
            return;
        };
        let Some(value) = tx.segment_progress() else {
            return;
        };
        let progress = tx.advance_progress(value);

        if let Some(ramps) = tx.ramps() {
            let outgoing = ramps.outgoing.progress().gain;
            let incoming = ramps.incoming.progress().gain;
            if let Err(e) = self.store.update_mixer_levels(outgoing, incoming) {
                debug!("Mixer levels not recorded: {}", e);
            }
        }

        self.events.emit_lossy(PlayerEvent::CrossfadeProgress {
            progress,
            timestamp: chrono::Utc::now(),
        });
    }

    /// fading -> committing, only once both ramps verifiably reached target
    async fn commit(&mut self) -> Result<FadeOutcome> {
        self.phase = CrossfadePhase::Committing;

        let (outgoing, incoming, finished) = match self.transaction.as_ref() {
            Some(tx) => (
                tx.outgoing,
                tx.incoming,
                tx.ramps().is_some_and(RampPair::both_finished),
            ),
            None => return Err(Error::InvalidState("no crossfade to commit".into())),
        };

        let outgoing_gain = self.engine.current_gain(outgoing).await;
        let incoming_gain = self.engine.current_gain(incoming).await;
        if !finished
            || outgoing_gain > GAIN_TOLERANCE
            || incoming_gain < 1.0 - GAIN_TOLERANCE
        {
            warn!(
                "Crossfade ramps ended unverified (outgoing {:.3}, incoming {:.3})",
                outgoing_gain, incoming_gain
            );
            self.rollback(RollbackReason::Unverified).await?;
            return Err(Error::EngineFailure(
                "crossfade ramps did not reach their targets".into(),
            ));
        }

        self.finish_commit().await
    }

    /// Swap identity, then retire the former active slot
    async fn finish_commit(&mut self) -> Result<FadeOutcome> {
        if let Err(e) = self.store.swap_active_slot() {
            self.rollback(RollbackReason::EngineFailure).await?;
            return Err(e);
        }

        let Some(mut tx) = self.transaction.take() else {
            return Err(Error::Inconsistent("transaction vanished during commit".into()));
        };
        self.phase = CrossfadePhase::Idle;
        tx.end_segment();

        if let Err(e) = self.engine.stop(tx.outgoing).await {
            warn!("Failed to stop {} after swap: {}", tx.outgoing, e);
        }
        self.store.release_slot(tx.outgoing)?;
        self.store.update_mixer_levels(1.0, 0.0)?;
        self.store.set_crossfading(false)?;

        let progress = tx.advance_progress(1.0);
        info!("Crossfade {} committed: {} active on {}", tx.id, tx.target, tx.incoming);
        self.events.emit_lossy(PlayerEvent::CrossfadeProgress {
            progress,
            timestamp: chrono::Utc::now(),
        });
        self.events.emit_lossy(PlayerEvent::CrossfadeCommitted {
            track: tx.target.clone(),
            active_slot: tx.incoming,
            timestamp: chrono::Utc::now(),
        });

        Ok(FadeOutcome::Committed {
            target: tx.target,
            tag: tx.tag,
        })
    }

    /// fading -> paused; idempotent while already paused
    pub async fn pause(&mut self) -> Result<()> {
        match self.phase {
            CrossfadePhase::Paused => {
                debug!("Crossfade already paused");
                return Ok(());
            }
            CrossfadePhase::Fading | CrossfadePhase::Preparing if self.transaction.is_some() => {}
            phase => {
                return Err(Error::InvalidState(format!(
                    "no crossfade to pause ({})",
                    phase
                )))
            }
        }

        if let Err(e) = self.park().await {
            warn!("Pausing crossfade failed: {}", e);
            self.rollback(RollbackReason::EngineFailure).await?;
            return Err(e);
        }
        Ok(())
    }

    async fn park(&mut self) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        let tx = self
            .transaction
            .as_mut()
            .ok_or_else(|| Error::InvalidState("no crossfade to pause".into()))?;

        match tx.end_segment() {
            Some(mut ramps) => {
                ramps.cancel();
                ramps.wait().await;
            }
            // Not started yet: the incoming slot must stay silent
            None => engine.set_gain(tx.incoming, 0.0).await?,
        }

        let outgoing_gain = engine.current_gain(tx.outgoing).await;
        let incoming_gain = engine.current_gain(tx.incoming).await;
        futures::future::try_join(engine.pause(tx.outgoing), engine.pause(tx.incoming)).await?;

        let elapsed = tx.elapsed();
        tx.park(PauseSnapshot {
            outgoing_gain,
            incoming_gain,
            elapsed,
            duration: tx.duration,
            curve: tx.curve,
        });
        let progress = tx.progress();
        self.phase = CrossfadePhase::Paused;

        self.store.update_mixer_levels(outgoing_gain, incoming_gain)?;
        info!("Crossfade paused at {:.0}%", progress * 100.0);
        self.events.emit_lossy(PlayerEvent::CrossfadePaused {
            progress,
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    /// paused -> fading
    ///
    /// Returns the strategy used. The caller drives the resumed fade.
    pub async fn resume(&mut self) -> Result<ResumeStrategy> {
        if self.phase != CrossfadePhase::Paused {
            return Err(Error::InvalidState(format!(
                "no paused crossfade to resume ({})",
                self.phase
            )));
        }

        match self.continue_fade().await {
            Ok(strategy) => Ok(strategy),
            Err(e) => {
                warn!("Resuming crossfade failed: {}", e);
                self.rollback(RollbackReason::EngineFailure).await?;
                Err(e)
            }
        }
    }

    async fn continue_fade(&mut self) -> Result<ResumeStrategy> {
        let engine = Arc::clone(&self.engine);
        let tx = self
            .transaction
            .as_mut()
            .ok_or_else(|| Error::InvalidState("no crossfade to resume".into()))?;
        let snapshot = tx
            .pause_snapshot()
            .cloned()
            .ok_or_else(|| Error::Inconsistent("paused crossfade without snapshot".into()))?;

        let progress = tx.progress();
        let strategy = resume_strategy(&self.config, progress, snapshot.remaining());
        let segment = match strategy {
            ResumeStrategy::QuickFinish => self.config.quick_finish(),
            ResumeStrategy::Continue => snapshot.remaining(),
        };

        engine.synchronized_start(tx.outgoing, tx.incoming).await?;
        let ramps = RampPair {
            outgoing: engine
                .ramp_gain(tx.outgoing, snapshot.outgoing_gain, 0.0, segment, snapshot.curve)
                .await?,
            incoming: engine
                .ramp_gain(tx.incoming, snapshot.incoming_gain, 1.0, segment, snapshot.curve)
                .await?,
        };
        tx.begin_segment(ramps);
        self.phase = CrossfadePhase::Fading;

        info!(
            "Crossfade resumed at {:.0}% ({:?}, {} ms left)",
            progress * 100.0,
            strategy,
            segment.as_millis()
        );
        self.events.emit_lossy(PlayerEvent::CrossfadeResumed {
            progress,
            strategy,
            timestamp: chrono::Utc::now(),
        });
        Ok(strategy)
    }

    /// Abort the crossfade, restoring the outgoing slot as the single
    /// audible slot
    ///
    /// A no-op when no transaction exists.
    pub async fn rollback(&mut self, reason: RollbackReason) -> Result<()> {
        let Some(mut tx) = self.transaction.take() else {
            debug!("Rollback requested with no crossfade in progress");
            self.phase = CrossfadePhase::Idle;
            return Ok(());
        };
        self.phase = CrossfadePhase::RollingBack;
        warn!(
            "Rolling back crossfade {} to {} at {:.0}% ({})",
            tx.id,
            tx.target,
            tx.progress() * 100.0,
            reason
        );

        let was_paused = tx.is_paused();
        let running = tx.end_segment();
        if let Some(ramps) = &running {
            ramps.cancel();
        }

        let (outgoing, incoming) = (tx.outgoing, tx.incoming);
        let restored = if running.is_some() && !was_paused {
            self.ramp_back(outgoing, incoming, tx.curve).await
        } else {
            self.set_gains(outgoing, 1.0, incoming, 0.0).await
        };
        if let Err(e) = restored {
            warn!("Restoring gains during rollback failed: {}", e);
        }
        if let Err(e) = self.engine.stop(incoming).await {
            warn!("Failed to stop {} during rollback: {}", incoming, e);
        }

        self.phase = CrossfadePhase::Idle;
        self.store.release_slot(incoming)?;
        self.store.update_mixer_levels(1.0, 0.0)?;
        self.store.set_crossfading(false)?;

        self.events.emit_lossy(PlayerEvent::CrossfadeRolledBack {
            progress: tx.progress(),
            reason,
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    /// Ramp back over the fixed rollback duration
    async fn ramp_back(&self, outgoing: SlotId, incoming: SlotId, curve: FadeCurve) -> Result<()> {
        let duration = self.config.rollback();
        let outgoing_from = self.engine.current_gain(outgoing).await;
        let incoming_from = self.engine.current_gain(incoming).await;

        let mut ramps = RampPair {
            outgoing: self
                .engine
                .ramp_gain(outgoing, outgoing_from, 1.0, duration, curve)
                .await?,
            incoming: self
                .engine
                .ramp_gain(incoming, incoming_from, 0.0, duration, curve)
                .await?,
        };
        ramps.wait().await;
        Ok(())
    }

    async fn set_gains(
        &self,
        first: SlotId,
        first_gain: f32,
        second: SlotId,
        second_gain: f32,
    ) -> Result<()> {
        self.engine.set_gain(first, first_gain).await?;
        self.engine.set_gain(second, second_gain).await
    }
}

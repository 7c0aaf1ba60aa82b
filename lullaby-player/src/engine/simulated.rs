//! In-memory engine
//!
//! Implements the engine port without audio output: transport state and
//! mixer gains are plain values, ramps are tokio tasks ticking on the tokio
//! clock. Tests run it under a paused clock and inject load failures,
//! stalls and latency per locator.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use lullaby_common::{FadeCurve, SlotId, TrackHandle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{AudioEngine, RampHandle, RampReporter};
use crate::error::{Error, Result};

/// Ramp tick period
const RAMP_TICK: Duration = Duration::from_millis(10);

/// Nominal duration reported by `load`
const TRACK_DURATION: Duration = Duration::from_secs(180);

/// Transport state of one simulated player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stopped,
    Playing,
    Paused,
}

/// One recorded engine call
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Load { slot: SlotId, locator: String },
    Play(SlotId),
    Pause(SlotId),
    Stop(SlotId),
    Ramp {
        slot: SlotId,
        from: f32,
        to: f32,
        duration: Duration,
    },
    SynchronizedStart(SlotId, SlotId),
}

#[derive(Debug)]
struct SlotSim {
    track: Option<TrackHandle>,
    gain: f32,
    transport: Transport,
    ramp: Option<CancellationToken>,
    ramp_generation: u64,
}

impl Default for SlotSim {
    fn default() -> Self {
        Self {
            track: None,
            gain: 0.0,
            transport: Transport::Stopped,
            ramp: None,
            ramp_generation: 0,
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    slots: [SlotSim; 2],
    journal: Vec<EngineCall>,
    failing: Vec<String>,
    stalling: Vec<String>,
    load_latency: Duration,
    fail_synchronized_start: bool,
}

impl SimState {
    fn slot_mut(&mut self, slot: SlotId) -> &mut SlotSim {
        &mut self.slots[slot.index()]
    }

    fn cancel_ramp(&mut self, slot: SlotId) {
        if let Some(token) = self.slot_mut(slot).ramp.take() {
            token.cancel();
        }
    }
}

/// Simulated dual-slot engine
///
/// Cloning yields another handle to the same engine, so a test can keep one
/// for inspection while the controller owns another.
#[derive(Debug, Clone, Default)]
pub struct SimulatedEngine {
    inner: Arc<Mutex<SimState>>,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: EngineCall) {
        debug!("Engine call: {:?}", call);
        self.lock().journal.push(call);
    }

    /// Make loads of any locator containing `pattern` fail
    pub fn fail_locator(&self, pattern: impl Into<String>) {
        self.lock().failing.push(pattern.into());
    }

    /// Make loads of any locator containing `pattern` never complete
    pub fn stall_locator(&self, pattern: impl Into<String>) {
        self.lock().stalling.push(pattern.into());
    }

    pub fn set_load_latency(&self, latency: Duration) {
        self.lock().load_latency = latency;
    }

    pub fn fail_synchronized_start(&self, fail: bool) {
        self.lock().fail_synchronized_start = fail;
    }

    pub fn gain(&self, slot: SlotId) -> f32 {
        self.lock().slots[slot.index()].gain
    }

    pub fn transport(&self, slot: SlotId) -> Transport {
        self.lock().slots[slot.index()].transport
    }

    pub fn track(&self, slot: SlotId) -> Option<TrackHandle> {
        self.lock().slots[slot.index()].track.clone()
    }

    pub fn journal(&self) -> Vec<EngineCall> {
        self.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }

    /// Number of journaled calls matching `predicate`
    pub fn count_calls(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.lock().journal.iter().filter(|call| predicate(call)).count()
    }

    /// Apply a ramp step unless a newer ramp replaced this one
    fn apply_ramp_gain(
        &self,
        slot: SlotId,
        generation: u64,
        reporter: &RampReporter,
        gain: f32,
    ) -> bool {
        let mut state = self.lock();
        let slot_state = state.slot_mut(slot);
        if reporter.is_cancelled() || slot_state.ramp_generation != generation {
            return false;
        }
        slot_state.gain = gain;
        true
    }

    fn finish_ramp(&self, slot: SlotId, generation: u64) {
        let mut state = self.lock();
        let slot_state = state.slot_mut(slot);
        if slot_state.ramp_generation == generation {
            slot_state.ramp = None;
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_ramp(
        self,
        slot: SlotId,
        generation: u64,
        from: f32,
        to: f32,
        duration: Duration,
        curve: FadeCurve,
        reporter: RampReporter,
        superseded: CancellationToken,
    ) {
        let started = Instant::now();
        let mut ticker = time::interval(RAMP_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = reporter.cancelled() => {
                    reporter.cancelled_at(self.gain(slot));
                    break;
                }
                _ = superseded.cancelled() => {
                    reporter.cancelled_at(self.gain(slot));
                    break;
                }
                _ = ticker.tick() => {
                    let fraction =
                        (started.elapsed().as_secs_f32() / duration.as_secs_f32()).min(1.0);
                    let gain = curve.interpolate(from, to, fraction);

                    if !self.apply_ramp_gain(slot, generation, &reporter, gain) {
                        reporter.cancelled_at(self.gain(slot));
                        break;
                    }
                    if fraction >= 1.0 {
                        self.finish_ramp(slot, generation);
                        reporter.finish(to);
                        break;
                    }
                    reporter.report(fraction, gain);
                }
            }
        }
    }
}

#[async_trait]
impl AudioEngine for SimulatedEngine {
    async fn load(&self, track: &TrackHandle, slot: SlotId) -> Result<Duration> {
        self.record(EngineCall::Load {
            slot,
            locator: track.locator.clone(),
        });

        let (fails, stalls, latency) = {
            let state = self.lock();
            let matches = |patterns: &[String]| {
                patterns.iter().any(|p| track.locator.contains(p.as_str()))
            };
            (matches(&state.failing), matches(&state.stalling), state.load_latency)
        };

        if !latency.is_zero() {
            time::sleep(latency).await;
        }
        if stalls {
            std::future::pending::<()>().await;
        }
        if fails {
            return Err(Error::EngineFailure(format!("cannot decode {}", track.locator)));
        }

        let mut state = self.lock();
        let slot_state = state.slot_mut(slot);
        slot_state.track = Some(track.clone());
        slot_state.transport = Transport::Stopped;
        Ok(TRACK_DURATION)
    }

    async fn play(&self, slot: SlotId) -> Result<()> {
        self.record(EngineCall::Play(slot));
        let mut state = self.lock();
        let slot_state = state.slot_mut(slot);
        if slot_state.track.is_none() {
            return Err(Error::EngineFailure(format!("no track loaded on {}", slot)));
        }
        slot_state.transport = Transport::Playing;
        Ok(())
    }

    async fn pause(&self, slot: SlotId) -> Result<()> {
        self.record(EngineCall::Pause(slot));
        let mut state = self.lock();
        let slot_state = state.slot_mut(slot);
        if slot_state.transport == Transport::Playing {
            slot_state.transport = Transport::Paused;
        }
        Ok(())
    }

    async fn stop(&self, slot: SlotId) -> Result<()> {
        self.record(EngineCall::Stop(slot));
        self.lock().slot_mut(slot).transport = Transport::Stopped;
        Ok(())
    }

    async fn ramp_gain(
        &self,
        slot: SlotId,
        from: f32,
        to: f32,
        duration: Duration,
        curve: FadeCurve,
    ) -> Result<RampHandle> {
        self.record(EngineCall::Ramp {
            slot,
            from,
            to,
            duration,
        });
        let to = to.clamp(0.0, 1.0);

        let mut state = self.lock();
        state.cancel_ramp(slot);
        let slot_state = state.slot_mut(slot);
        slot_state.ramp_generation += 1;

        if duration.is_zero() {
            slot_state.gain = to;
            return Ok(RampHandle::completed(slot, to));
        }

        slot_state.gain = from.clamp(0.0, 1.0);
        let generation = slot_state.ramp_generation;
        let (handle, reporter) = RampHandle::channel(slot, from, to);
        let token = CancellationToken::new();
        slot_state.ramp = Some(token.clone());
        drop(state);

        tokio::spawn(self.clone().run_ramp(
            slot, generation, from, to, duration, curve, reporter, token,
        ));
        Ok(handle)
    }

    async fn current_gain(&self, slot: SlotId) -> f32 {
        self.gain(slot)
    }

    async fn synchronized_start(&self, first: SlotId, second: SlotId) -> Result<()> {
        self.record(EngineCall::SynchronizedStart(first, second));
        let mut state = self.lock();
        if state.fail_synchronized_start {
            return Err(Error::EngineFailure("synchronized start rejected".into()));
        }
        for slot in [first, second] {
            if state.slot_mut(slot).track.is_none() {
                return Err(Error::EngineFailure(format!("no track loaded on {}", slot)));
            }
        }
        for slot in [first, second] {
            state.slot_mut(slot).transport = Transport::Playing;
        }
        Ok(())
    }
}

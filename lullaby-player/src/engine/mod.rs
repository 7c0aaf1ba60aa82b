//! Engine port
//!
//! Abstract interface to a dual-slot rendering engine: two interchangeable
//! player+mixer pairs feeding a shared output bus. The control plane only
//! decides *when* transport and gain commands are issued; decoding, caching
//! and buffer scheduling live behind this trait.

mod ramp;
mod simulated;

pub use ramp::{RampHandle, RampProgress, RampReporter, RampState};
pub use simulated::{EngineCall, SimulatedEngine, Transport};

use std::time::Duration;

use async_trait::async_trait;
use lullaby_common::{FadeCurve, SlotId, TrackHandle};

use crate::error::Result;

/// Dual-slot rendering engine
///
/// Every operation may suspend. Implementations must tolerate `pause` and
/// `stop` on a slot that is not playing.
#[async_trait]
pub trait AudioEngine: Send + Sync + 'static {
    /// Load `track` onto `slot`, returning its duration
    ///
    /// Fails with `EngineFailure` on decode or I/O problems.
    async fn load(&self, track: &TrackHandle, slot: SlotId) -> Result<Duration>;

    async fn play(&self, slot: SlotId) -> Result<()>;

    async fn pause(&self, slot: SlotId) -> Result<()>;

    async fn stop(&self, slot: SlotId) -> Result<()>;

    /// Start a cancellable gain ramp on `slot`
    ///
    /// Starting a new ramp on a slot cancels the one already running there.
    async fn ramp_gain(
        &self,
        slot: SlotId,
        from: f32,
        to: f32,
        duration: Duration,
        curve: FadeCurve,
    ) -> Result<RampHandle>;

    async fn current_gain(&self, slot: SlotId) -> f32;

    /// Start both slots against the same output clock
    async fn synchronized_start(&self, first: SlotId, second: SlotId) -> Result<()>;

    /// Jump `slot` to `gain` immediately
    async fn set_gain(&self, slot: SlotId, gain: f32) -> Result<()> {
        let from = self.current_gain(slot).await;
        self.ramp_gain(slot, from, gain, Duration::ZERO, FadeCurve::Linear)
            .await
            .map(|_| ())
    }
}

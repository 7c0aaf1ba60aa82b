//! Crossfade transaction
//!
//! One in-flight or paused crossfade. Created when the incoming track is
//! loaded, destroyed on commit or rollback.

use std::time::Duration;

use lullaby_common::{Direction, FadeCurve, SlotId, TrackHandle};
use tokio::time::Instant;
use uuid::Uuid;

use crate::engine::RampHandle;

/// Playlist move to commit when the crossfade swaps slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationTag {
    pub direction: Direction,
    pub steps: usize,
}

/// Exact mixer state captured when a crossfade is paused
#[derive(Debug, Clone, PartialEq)]
pub struct PauseSnapshot {
    pub outgoing_gain: f32,
    pub incoming_gain: f32,
    pub elapsed: Duration,
    pub duration: Duration,
    pub curve: FadeCurve,
}

impl PauseSnapshot {
    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.elapsed)
    }
}

/// The pair of ramps of the current fade segment
#[derive(Debug, Clone)]
pub(crate) struct RampPair {
    pub outgoing: RampHandle,
    pub incoming: RampHandle,
}

impl RampPair {
    pub fn cancel(&self) {
        self.outgoing.cancel();
        self.incoming.cancel();
    }

    pub fn both_finished(&self) -> bool {
        self.outgoing.is_finished() && self.incoming.is_finished()
    }

    /// Segment fraction, bounded by the slower ramp
    pub fn fraction(&self) -> f32 {
        self.outgoing
            .progress()
            .fraction
            .min(self.incoming.progress().fraction)
    }

    /// Resolves when both ramps are finished or cancelled
    pub async fn wait(&mut self) {
        tokio::join!(self.outgoing.wait(), self.incoming.wait());
    }
}

#[derive(Debug)]
pub struct CrossfadeTransaction {
    pub id: Uuid,
    /// Track on the outgoing slot when the crossfade began
    pub source: Option<TrackHandle>,
    pub target: TrackHandle,
    pub outgoing: SlotId,
    pub incoming: SlotId,
    pub duration: Duration,
    pub curve: FadeCurve,
    pub tag: Option<NavigationTag>,
    progress: f32,
    paused: Option<PauseSnapshot>,
    ramps: Option<RampPair>,
    /// Progress covered before the current ramp segment
    segment_base: f32,
    segment_started: Option<Instant>,
    elapsed_before: Duration,
}

impl CrossfadeTransaction {
    pub fn new(
        source: Option<TrackHandle>,
        target: TrackHandle,
        outgoing: SlotId,
        duration: Duration,
        curve: FadeCurve,
        tag: Option<NavigationTag>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            target,
            outgoing,
            incoming: outgoing.other(),
            duration,
            curve,
            tag,
            progress: 0.0,
            paused: None,
            ramps: None,
            segment_base: 0.0,
            segment_started: None,
            elapsed_before: Duration::ZERO,
        }
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Raise progress to `value`; never moves backwards
    pub fn advance_progress(&mut self, value: f32) -> f32 {
        self.progress = self.progress.max(value.clamp(0.0, 1.0));
        self.progress
    }

    /// Progress implied by the current segment's ramps
    pub(crate) fn segment_progress(&self) -> Option<f32> {
        self.ramps
            .as_ref()
            .map(|ramps| self.segment_base + (1.0 - self.segment_base) * ramps.fraction())
    }

    pub fn is_paused(&self) -> bool {
        self.paused.is_some()
    }

    pub fn pause_snapshot(&self) -> Option<&PauseSnapshot> {
        self.paused.as_ref()
    }

    /// Whether gains have started moving for this transaction
    pub fn has_started(&self) -> bool {
        self.ramps.is_some() || self.paused.is_some()
    }

    pub(crate) fn ramps(&self) -> Option<&RampPair> {
        self.ramps.as_ref()
    }

    /// Time spent fading so far, across segments
    pub fn elapsed(&self) -> Duration {
        self.elapsed_before
            + self
                .segment_started
                .map(|started| started.elapsed())
                .unwrap_or_default()
    }

    /// Install the ramps of a new fade segment
    pub(crate) fn begin_segment(&mut self, ramps: RampPair) {
        self.segment_base = self.progress;
        self.segment_started = Some(Instant::now());
        self.ramps = Some(ramps);
        self.paused = None;
    }

    /// Close the running segment and hand back its ramps
    pub(crate) fn end_segment(&mut self) -> Option<RampPair> {
        self.elapsed_before = self.elapsed();
        self.segment_started = None;
        self.ramps.take()
    }

    pub(crate) fn park(&mut self, snapshot: PauseSnapshot) {
        self.paused = Some(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transaction() -> CrossfadeTransaction {
        CrossfadeTransaction::new(
            Some(TrackHandle::new("a.flac")),
            TrackHandle::new("b.flac"),
            SlotId::A,
            Duration::from_secs(4),
            FadeCurve::EqualPower,
            None,
        )
    }

    #[test]
    fn test_incoming_is_other_slot() {
        let tx = transaction();
        assert_eq!(tx.incoming, SlotId::B);
        assert!(!tx.has_started());
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut tx = transaction();
        assert_eq!(tx.advance_progress(0.4), 0.4);
        assert_eq!(tx.advance_progress(0.2), 0.4);
        assert_eq!(tx.advance_progress(1.7), 1.0);
    }

    #[test]
    fn test_pause_snapshot_remaining() {
        let snapshot = PauseSnapshot {
            outgoing_gain: 0.6,
            incoming_gain: 0.8,
            elapsed: Duration::from_millis(1500),
            duration: Duration::from_secs(4),
            curve: FadeCurve::Linear,
        };
        assert_eq!(snapshot.remaining(), Duration::from_millis(2500));
    }
}

//! Authoritative playback state
//!
//! The `StateStore` is the single owner of playback identity (which slot is
//! active), playback mode, the two slot records and the crossfade flag. It
//! performs no I/O and never suspends: every mutation clones the current
//! snapshot, applies the change, validates the invariants and only then
//! replaces the stored value. A failing check leaves the previous state in
//! place and returns `Error::Inconsistent`.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use lullaby_common::{EventBus, PlaybackMode, PlayerEvent, SlotId, TrackHandle};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Per-slot record
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackSlotState {
    /// Loaded track (None when the slot is released)
    pub track: Option<TrackHandle>,
    /// Last reported mixer level (0.0-1.0)
    pub gain: f32,
    /// Participates in the current crossfade
    pub crossfading: bool,
}

/// Full copy of the store contents
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreSnapshot {
    pub mode: PlaybackMode,
    /// Active slot; the other one is inactive by definition
    pub active: SlotId,
    pub slots: [TrackSlotState; 2],
    pub is_crossfading: bool,
    /// Number of identity flips since construction
    pub swap_count: u64,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self {
            mode: PlaybackMode::Idle,
            active: SlotId::A,
            slots: [TrackSlotState::default(), TrackSlotState::default()],
            is_crossfading: false,
            swap_count: 0,
        }
    }
}

impl StoreSnapshot {
    pub fn slot(&self, slot: SlotId) -> &TrackSlotState {
        &self.slots[slot.index()]
    }

    fn slot_mut(&mut self, slot: SlotId) -> &mut TrackSlotState {
        &mut self.slots[slot.index()]
    }

    pub fn inactive(&self) -> SlotId {
        self.active.other()
    }

    pub fn active_slot(&self) -> &TrackSlotState {
        self.slot(self.active)
    }

    pub fn inactive_slot(&self) -> &TrackSlotState {
        self.slot(self.inactive())
    }

    pub fn active_track(&self) -> Option<&TrackHandle> {
        self.active_slot().track.as_ref()
    }

    /// Whether every store invariant holds
    pub fn is_consistent(&self) -> bool {
        self.check_invariants().is_ok()
    }

    /// Validate the store invariants, naming the first violation
    pub fn check_invariants(&self) -> Result<()> {
        for slot in SlotId::both() {
            let state = self.slot(slot);
            if !(0.0..=1.0).contains(&state.gain) {
                return Err(Error::Inconsistent(format!(
                    "{} gain {} outside 0.0-1.0",
                    slot, state.gain
                )));
            }
            if state.crossfading && !self.is_crossfading {
                return Err(Error::Inconsistent(format!(
                    "{} flagged as crossfading with no crossfade in progress",
                    slot
                )));
            }
        }

        if self.mode == PlaybackMode::Idle && self.is_crossfading {
            return Err(Error::Inconsistent("crossfading while idle".into()));
        }

        if self.mode.has_audible_track() && self.active_track().is_none() {
            return Err(Error::Inconsistent(format!(
                "mode {} with no track on the active {}",
                self.mode, self.active
            )));
        }

        // A deliberate fade step is covered by the crossfade flag
        if self.mode == PlaybackMode::Playing
            && !self.is_crossfading
            && self.active_slot().gain <= 0.0
        {
            return Err(Error::Inconsistent(format!(
                "playing with silent active {}",
                self.active
            )));
        }

        Ok(())
    }
}

/// Caller-facing summary of the store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerState {
    pub mode: PlaybackMode,
    pub active_track: Option<TrackHandle>,
    pub is_crossfading: bool,
}

/// Single authoritative playback state
///
/// Reads are non-blocking snapshots; writes go through the named entry
/// points below and are validated before they are committed.
pub struct StateStore {
    inner: RwLock<StoreSnapshot>,
    events: EventBus,
}

impl StateStore {
    pub fn new(events: EventBus) -> Self {
        Self {
            inner: RwLock::new(StoreSnapshot::default()),
            events,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreSnapshot> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreSnapshot> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone, mutate, validate, replace
    ///
    /// Returns the previous and the committed snapshot so callers can emit
    /// events after the lock is released.
    fn commit<F>(&self, op: &str, mutate: F) -> Result<(StoreSnapshot, StoreSnapshot)>
    where
        F: FnOnce(&mut StoreSnapshot) -> Result<()>,
    {
        let mut guard = self.write();
        let mut next = guard.clone();
        mutate(&mut next)?;

        if let Err(e) = next.check_invariants() {
            warn!("State store rejected {}: {}", op, e);
            return Err(e);
        }

        let previous = std::mem::replace(&mut *guard, next.clone());
        Ok((previous, next))
    }

    fn announce_mode(&self, old_mode: PlaybackMode, new_mode: PlaybackMode) {
        if old_mode == new_mode {
            return;
        }
        info!("Playback mode: {} -> {}", old_mode, new_mode);
        self.events.emit_lossy(PlayerEvent::ModeChanged {
            old_mode,
            new_mode,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Read-only copy of the full store
    pub fn snapshot(&self) -> StoreSnapshot {
        self.read().clone()
    }

    /// Caller-facing summary
    pub fn state(&self) -> PlayerState {
        let snapshot = self.read();
        PlayerState {
            mode: snapshot.mode,
            active_track: snapshot.active_track().cloned(),
            is_crossfading: snapshot.is_crossfading,
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        self.read().mode
    }

    pub fn active_slot(&self) -> SlotId {
        self.read().active
    }

    pub fn is_crossfading(&self) -> bool {
        self.read().is_crossfading
    }

    pub fn is_consistent(&self) -> bool {
        self.read().is_consistent()
    }

    /// Transition to `new_mode`
    ///
    /// Rejected with `InvalidTransition` (state unchanged) when the move is
    /// not permitted from the current mode.
    pub fn set_mode(&self, new_mode: PlaybackMode) -> Result<()> {
        let (previous, _) = self.commit("set_mode", |s| {
            if !s.mode.can_transition_to(new_mode) {
                return Err(Error::InvalidTransition {
                    from: s.mode,
                    to: new_mode,
                });
            }
            s.mode = new_mode;
            Ok(())
        })?;
        self.announce_mode(previous.mode, new_mode);
        Ok(())
    }

    /// Flip which slot is active
    ///
    /// Identity only: tracks stay in their slots and mixer levels are not
    /// touched.
    pub fn swap_active_slot(&self) -> Result<SlotId> {
        let (_, next) = self.commit("swap_active_slot", |s| {
            s.active = s.active.other();
            s.swap_count += 1;
            Ok(())
        })?;
        debug!("Active slot is now {}", next.active);
        Ok(next.active)
    }

    /// Record `track` as loaded on `slot`, clearing its crossfade flag
    pub fn load_track(&self, track: TrackHandle, slot: SlotId) -> Result<()> {
        debug!("Store: {} loaded on {}", track, slot);
        self.commit("load_track", |s| {
            let state = s.slot_mut(slot);
            state.track = Some(track);
            state.crossfading = false;
            Ok(())
        })?;
        Ok(())
    }

    /// Clear a slot's track, gain and crossfade flag
    pub fn release_slot(&self, slot: SlotId) -> Result<()> {
        self.commit("release_slot", |s| {
            *s.slot_mut(slot) = TrackSlotState::default();
            Ok(())
        })?;
        Ok(())
    }

    /// Record engine-reported gains for the active and inactive slots
    pub fn update_mixer_levels(&self, active: f32, inactive: f32) -> Result<()> {
        self.commit("update_mixer_levels", |s| {
            let active_slot = s.active;
            s.slot_mut(active_slot).gain = active.clamp(0.0, 1.0);
            s.slot_mut(active_slot.other()).gain = inactive.clamp(0.0, 1.0);
            Ok(())
        })?;
        Ok(())
    }

    /// Toggle the crossfade flag together with both slots' participation
    pub fn set_crossfading(&self, crossfading: bool) -> Result<()> {
        self.commit("set_crossfading", |s| {
            s.is_crossfading = crossfading;
            for slot in SlotId::both() {
                s.slot_mut(slot).crossfading = crossfading;
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Full copy for a later `restore_snapshot`
    pub fn capture_snapshot(&self) -> StoreSnapshot {
        self.snapshot()
    }

    /// Replace the store contents with a previously captured copy
    pub fn restore_snapshot(&self, snapshot: StoreSnapshot) -> Result<()> {
        let new_mode = snapshot.mode;
        let (previous, _) = self.commit("restore_snapshot", move |s| {
            *s = snapshot;
            Ok(())
        })?;
        self.announce_mode(previous.mode, new_mode);
        Ok(())
    }

    /// Return a finished or failed store to the idle baseline
    ///
    /// Identity and swap count are kept; slots are released.
    pub fn reset(&self) -> Result<()> {
        let (previous, _) = self.commit("reset", |s| {
            if !s.mode.is_terminal() {
                return Err(Error::InvalidState(format!(
                    "reset requires finished or failed, mode is {}",
                    s.mode
                )));
            }
            s.mode = PlaybackMode::Idle;
            s.is_crossfading = false;
            s.slots = [TrackSlotState::default(), TrackSlotState::default()];
            Ok(())
        })?;
        self.announce_mode(previous.mode, PlaybackMode::Idle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> StateStore {
        StateStore::new(EventBus::new(16))
    }

    fn playing_store() -> StateStore {
        let store = store();
        store.load_track(TrackHandle::new("a.flac"), SlotId::A).unwrap();
        store.set_mode(PlaybackMode::Preparing).unwrap();
        store.update_mixer_levels(1.0, 0.0).unwrap();
        store.set_mode(PlaybackMode::Playing).unwrap();
        store
    }

    #[test]
    fn test_initial_state() {
        let snapshot = store().snapshot();
        assert_eq!(snapshot.mode, PlaybackMode::Idle);
        assert_eq!(snapshot.active, SlotId::A);
        assert!(!snapshot.is_crossfading);
        assert!(snapshot.is_consistent());
    }

    #[test]
    fn test_invalid_transition_leaves_state_unchanged() {
        let store = store();
        let before = store.snapshot();

        let err = store.set_mode(PlaybackMode::Playing).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: PlaybackMode::Idle,
                to: PlaybackMode::Playing
            }
        ));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_playing_requires_loaded_active_track() {
        let store = store();
        store.set_mode(PlaybackMode::Preparing).unwrap();

        let err = store.set_mode(PlaybackMode::Playing).unwrap_err();
        assert!(matches!(err, Error::Inconsistent(_)));
        assert_eq!(store.mode(), PlaybackMode::Preparing);
    }

    #[test]
    fn test_swap_flips_identity_only() {
        let store = playing_store();
        store.load_track(TrackHandle::new("b.flac"), SlotId::B).unwrap();
        store.set_crossfading(true).unwrap();
        let before = store.snapshot();

        assert_eq!(store.swap_active_slot().unwrap(), SlotId::B);

        let after = store.snapshot();
        assert_eq!(after.slots, before.slots);
        assert_eq!(after.swap_count, before.swap_count + 1);
        assert_eq!(after.active_track().unwrap().locator, "b.flac");
    }

    #[test]
    fn test_silent_active_slot_rejected_while_playing() {
        let store = playing_store();
        let err = store.update_mixer_levels(0.0, 0.0).unwrap_err();
        assert!(matches!(err, Error::Inconsistent(_)));

        // Allowed while a crossfade owns the gains
        store.set_crossfading(true).unwrap();
        store.update_mixer_levels(0.0, 1.0).unwrap();
    }

    #[test]
    fn test_mode_change_is_broadcast() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let store = StateStore::new(bus);

        store.set_mode(PlaybackMode::Preparing).unwrap();

        match rx.try_recv().unwrap() {
            PlayerEvent::ModeChanged {
                old_mode, new_mode, ..
            } => {
                assert_eq!(old_mode, PlaybackMode::Idle);
                assert_eq!(new_mode, PlaybackMode::Preparing);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_restore_snapshot_round_trip() {
        let store = playing_store();
        let saved = store.capture_snapshot();

        store.load_track(TrackHandle::new("b.flac"), SlotId::B).unwrap();
        store.set_crossfading(true).unwrap();
        store.restore_snapshot(saved.clone()).unwrap();

        assert_eq!(store.snapshot(), saved);
    }

    #[test]
    fn test_reset_only_from_terminal_modes() {
        let store = playing_store();
        assert!(store.reset().is_err());

        store.set_mode(PlaybackMode::FadingOut).unwrap();
        store.set_mode(PlaybackMode::Finished).unwrap();
        store.reset().unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.mode, PlaybackMode::Idle);
        assert!(snapshot.active_track().is_none());
    }

    #[test]
    fn test_release_slot_clears_record() {
        let store = store();
        store.load_track(TrackHandle::new("b.flac"), SlotId::B).unwrap();
        store.release_slot(SlotId::B).unwrap();
        assert_eq!(*store.snapshot().slot(SlotId::B), TrackSlotState::default());
    }
}

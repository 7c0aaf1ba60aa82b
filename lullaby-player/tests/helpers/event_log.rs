//! Event capture
//!
//! Drains a broadcast receiver on demand instead of from a background task,
//! so assertions see every event emitted before the awaited reply.

use std::sync::Mutex;

use lullaby_common::{PlayerEvent, ResumeStrategy, RollbackReason};
use tokio::sync::broadcast::{self, error::TryRecvError};

/// One command lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandTrace {
    Started { sequence: u64, label: String },
    Settled { sequence: u64, label: String, success: bool },
}

pub struct EventLog {
    rx: Mutex<broadcast::Receiver<PlayerEvent>>,
    seen: Mutex<Vec<PlayerEvent>>,
}

impl EventLog {
    pub fn new(rx: broadcast::Receiver<PlayerEvent>) -> Self {
        Self {
            rx: Mutex::new(rx),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Every event received so far, oldest first
    pub fn events(&self) -> Vec<PlayerEvent> {
        let mut rx = self.rx.lock().unwrap();
        let mut seen = self.seen.lock().unwrap();
        loop {
            match rx.try_recv() {
                Ok(event) => seen.push(event),
                Err(TryRecvError::Lagged(n)) => panic!("event log lagged by {} events", n),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        seen.clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(PlayerEvent::event_type).collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }

    /// Crossfade event kinds only, in order
    pub fn crossfade_kinds(&self) -> Vec<&'static str> {
        self.kinds()
            .into_iter()
            .filter(|k| k.starts_with("Crossfade") && *k != "CrossfadeProgress")
            .collect()
    }

    pub fn progress_values(&self) -> Vec<f32> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PlayerEvent::CrossfadeProgress { progress, .. } => Some(progress),
                _ => None,
            })
            .collect()
    }

    pub fn rollback_reasons(&self) -> Vec<RollbackReason> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PlayerEvent::CrossfadeRolledBack { reason, .. } => Some(reason),
                _ => None,
            })
            .collect()
    }

    pub fn resume_strategies(&self) -> Vec<ResumeStrategy> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PlayerEvent::CrossfadeResumed { strategy, .. } => Some(strategy),
                _ => None,
            })
            .collect()
    }

    /// Locators announced by `TrackChanged`, in order
    pub fn track_changes(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PlayerEvent::TrackChanged { track, .. } => Some(track.locator),
                _ => None,
            })
            .collect()
    }

    pub fn command_trace(&self) -> Vec<CommandTrace> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PlayerEvent::CommandStarted { sequence, label, .. } => {
                    Some(CommandTrace::Started { sequence, label })
                }
                PlayerEvent::CommandSettled {
                    sequence,
                    label,
                    success,
                    ..
                } => Some(CommandTrace::Settled {
                    sequence,
                    label,
                    success,
                }),
                _ => None,
            })
            .collect()
    }

    /// Forget everything received so far
    pub fn clear(&self) {
        self.events();
        self.seen.lock().unwrap().clear();
    }
}

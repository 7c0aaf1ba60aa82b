//! Gain ramp handles
//!
//! A ramp is driven by the engine and observed by the control plane through a
//! `watch` channel. Cancellation goes the other way through a
//! `CancellationToken`, which leaves the gain wherever the ramp stopped.

use lullaby_common::SlotId;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Lifecycle of a single ramp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampState {
    Running,
    /// Reached its target gain
    Finished,
    /// Stopped early; gain left where it was
    Cancelled,
}

/// Latest report from a running ramp
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampProgress {
    /// Elapsed fraction of the ramp duration (0.0-1.0)
    pub fraction: f32,
    /// Gain applied at this point
    pub gain: f32,
    pub state: RampState,
}

/// Control-plane side of a gain ramp
#[derive(Debug, Clone)]
pub struct RampHandle {
    slot: SlotId,
    target: f32,
    progress: watch::Receiver<RampProgress>,
    cancel: CancellationToken,
}

/// Engine side of a gain ramp
#[derive(Debug)]
pub struct RampReporter {
    progress: watch::Sender<RampProgress>,
    cancel: CancellationToken,
}

impl RampHandle {
    /// Create a connected handle/reporter pair for a ramp starting at `from`
    pub fn channel(slot: SlotId, from: f32, target: f32) -> (RampHandle, RampReporter) {
        let (tx, rx) = watch::channel(RampProgress {
            fraction: 0.0,
            gain: from,
            state: RampState::Running,
        });
        let cancel = CancellationToken::new();

        let handle = RampHandle {
            slot,
            target,
            progress: rx,
            cancel: cancel.clone(),
        };
        let reporter = RampReporter {
            progress: tx,
            cancel,
        };
        (handle, reporter)
    }

    /// Handle for a ramp that completed on creation (zero duration)
    pub fn completed(slot: SlotId, target: f32) -> RampHandle {
        let (handle, reporter) = RampHandle::channel(slot, target, target);
        reporter.finish(target);
        handle
    }

    /// Latest reported progress
    pub fn progress(&self) -> RampProgress {
        *self.progress.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.progress().state == RampState::Finished
    }

    /// Finished or cancelled
    pub fn is_done(&self) -> bool {
        self.progress().state != RampState::Running
    }

    /// Wait for the next progress report
    ///
    /// Returns false once the engine side is gone.
    pub async fn changed(&mut self) -> bool {
        self.progress.changed().await.is_ok()
    }

    /// Wait until the ramp finishes or is cancelled
    ///
    /// If the engine drops the ramp without settling it, the last report
    /// (still `Running`) is returned.
    pub async fn wait(&mut self) -> RampProgress {
        loop {
            let current = *self.progress.borrow_and_update();
            if current.state != RampState::Running {
                return current;
            }
            if self.progress.changed().await.is_err() {
                return *self.progress.borrow();
            }
        }
    }

    /// Stop the ramp where it is; idempotent
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() && !self.is_done() {
            trace!("Cancelling ramp on {} toward {:.2}", self.slot, self.target);
        }
        self.cancel.cancel();
    }
}

impl RampReporter {
    pub fn report(&self, fraction: f32, gain: f32) {
        self.progress.send_replace(RampProgress {
            fraction: fraction.clamp(0.0, 1.0),
            gain,
            state: RampState::Running,
        });
    }

    pub fn finish(&self, gain: f32) {
        self.progress.send_replace(RampProgress {
            fraction: 1.0,
            gain,
            state: RampState::Finished,
        });
    }

    pub fn cancelled_at(&self, gain: f32) {
        let fraction = self.progress.borrow().fraction;
        self.progress.send_replace(RampProgress {
            fraction,
            gain,
            state: RampState::Cancelled,
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the control plane cancels the ramp
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completed_handle_is_finished() {
        let mut handle = RampHandle::completed(SlotId::A, 1.0);
        assert!(handle.is_finished());
        let progress = handle.wait().await;
        assert_eq!(progress.gain, 1.0);
        assert_eq!(progress.fraction, 1.0);
    }

    #[tokio::test]
    async fn test_wait_observes_finish() {
        let (mut handle, reporter) = RampHandle::channel(SlotId::B, 0.0, 1.0);
        let task = tokio::spawn(async move {
            reporter.report(0.5, 0.7);
            reporter.finish(1.0);
        });

        let progress = handle.wait().await;
        assert_eq!(progress.state, RampState::Finished);
        assert_eq!(progress.gain, 1.0);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_is_seen_by_reporter() {
        let (handle, reporter) = RampHandle::channel(SlotId::A, 1.0, 0.0);
        reporter.report(0.3, 0.8);

        handle.cancel();
        handle.cancel();
        reporter.cancelled().await;
        reporter.cancelled_at(0.8);

        let progress = handle.progress();
        assert_eq!(progress.state, RampState::Cancelled);
        assert_eq!(progress.fraction, 0.3);
        assert!(handle.is_done());
        assert!(!handle.is_finished());
    }

    #[tokio::test]
    async fn test_dropped_reporter_leaves_running() {
        let (mut handle, reporter) = RampHandle::channel(SlotId::A, 1.0, 0.0);
        drop(reporter);
        assert_eq!(handle.wait().await.state, RampState::Running);
    }
}

//! Crossfade orchestration
//!
//! Interruptible, abortable transition between the two engine slots.
//!
//! ```text
//! idle -> preparing -> fading -> committing -> idle
//!                      fading <-> paused
//!         preparing | fading | paused -> rollingBack -> idle
//! ```

mod orchestrator;
mod timeout;
mod transaction;

pub use orchestrator::{CrossfadeOrchestrator, FadeOutcome};
pub use timeout::AdaptiveTimeout;
pub use transaction::{CrossfadeTransaction, NavigationTag, PauseSnapshot};

/// Lifecycle phase of the crossfade orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossfadePhase {
    Idle,
    Preparing,
    Fading,
    Paused,
    Committing,
    RollingBack,
}

impl std::fmt::Display for CrossfadePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CrossfadePhase::Idle => "idle",
            CrossfadePhase::Preparing => "preparing",
            CrossfadePhase::Fading => "fading",
            CrossfadePhase::Paused => "paused",
            CrossfadePhase::Committing => "committing",
            CrossfadePhase::RollingBack => "rollingBack",
        };
        write!(f, "{}", name)
    }
}

/// Cooperative interruption raised against a running command
///
/// Ordered by strength: when several are pending, the strongest wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Interrupt {
    /// Pause request: park the crossfade and return
    Park,
    /// Superseding command: roll the crossfade back
    Abort,
}

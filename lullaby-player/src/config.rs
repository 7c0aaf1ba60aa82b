//! Player configuration
//!
//! Bootstrap configuration loaded from TOML. Every field has a built-in
//! default, so an empty or missing file yields a fully usable config.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (`--crossfade-ms`, ...)
//! 2. Environment variables (via clap `env`)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use std::path::Path;
use std::time::Duration;

use lullaby_common::config::read_toml_or_default;
use lullaby_common::FadeCurve;
use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};

/// Upper bound for `load_timeout.multiplier`
const MAX_TIMEOUT_MULTIPLIER: f64 = 100.0;

/// Top-level player configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerConfig {
    /// Maximum number of commands waiting behind the running one
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Candidates tried by a navigation command before `NoValidTarget`
    #[serde(default = "default_navigation_attempts")]
    pub navigation_attempts: usize,

    /// Event channel buffer size
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    #[serde(default)]
    pub crossfade: CrossfadeConfig,

    #[serde(default)]
    pub load_timeout: LoadTimeoutConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Crossfade timing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrossfadeConfig {
    /// Default overlap for skips and track-ending transitions
    #[serde(default = "default_crossfade_ms")]
    pub duration_ms: u64,

    #[serde(default)]
    pub curve: FadeCurve,

    /// Cadence of `CrossfadeProgress` events
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Fixed duration of the rollback ramp, independent of the fade
    #[serde(default = "default_rollback_ms")]
    pub rollback_ms: u64,

    /// Duration of the collapsed ramp used by quick-finish resume
    #[serde(default = "default_quick_finish_ms")]
    pub quick_finish_ms: u64,

    /// Progress above which resume always quick-finishes
    #[serde(default = "default_quick_finish_threshold")]
    pub quick_finish_threshold: f32,

    /// Allow resuming from the snapshotted gains over the remaining duration
    ///
    /// When disabled, resume always quick-finishes.
    #[serde(default)]
    pub continue_resume: bool,
}

/// Adaptive load deadline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoadTimeoutConfig {
    #[serde(default = "default_initial_timeout_ms")]
    pub initial_ms: u64,

    #[serde(default = "default_min_timeout_ms")]
    pub min_ms: u64,

    #[serde(default = "default_max_timeout_ms")]
    pub max_ms: u64,

    /// Deadline = multiplier x smoothed observed latency
    #[serde(default = "default_timeout_multiplier")]
    pub multiplier: f64,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    ///
    /// Applied only when `RUST_LOG` is unset; None keeps the built-in filter.
    #[serde(default)]
    pub level: Option<String>,
}

fn default_queue_depth() -> usize {
    3
}

fn default_navigation_attempts() -> usize {
    3
}

fn default_event_capacity() -> usize {
    256
}

fn default_crossfade_ms() -> u64 {
    6000
}

fn default_progress_interval_ms() -> u64 {
    50
}

fn default_rollback_ms() -> u64 {
    300
}

fn default_quick_finish_ms() -> u64 {
    500
}

fn default_quick_finish_threshold() -> f32 {
    0.8
}

fn default_initial_timeout_ms() -> u64 {
    2000
}

fn default_min_timeout_ms() -> u64 {
    500
}

fn default_max_timeout_ms() -> u64 {
    8000
}

fn default_timeout_multiplier() -> f64 {
    3.0
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
            navigation_attempts: default_navigation_attempts(),
            event_capacity: default_event_capacity(),
            crossfade: CrossfadeConfig::default(),
            load_timeout: LoadTimeoutConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CrossfadeConfig {
    fn default() -> Self {
        Self {
            duration_ms: default_crossfade_ms(),
            curve: FadeCurve::default(),
            progress_interval_ms: default_progress_interval_ms(),
            rollback_ms: default_rollback_ms(),
            quick_finish_ms: default_quick_finish_ms(),
            quick_finish_threshold: default_quick_finish_threshold(),
            continue_resume: false,
        }
    }
}

impl Default for LoadTimeoutConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_initial_timeout_ms(),
            min_ms: default_min_timeout_ms(),
            max_ms: default_max_timeout_ms(),
            multiplier: default_timeout_multiplier(),
        }
    }
}

impl PlayerConfig {
    /// Load from a TOML file, degrading to defaults when it is missing
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: PlayerConfig = read_toml_or_default(path)?;
        config.validate()?;

        if let Some(path) = path {
            info!("Loaded player configuration from {}", path.display());
        }
        Ok(config)
    }

    /// Reject values the control plane cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.queue_depth == 0 {
            return Err(Error::Config("queue_depth must be at least 1".into()));
        }
        if self.navigation_attempts == 0 {
            return Err(Error::Config("navigation_attempts must be at least 1".into()));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be at least 1".into()));
        }
        if self.crossfade.progress_interval_ms == 0 {
            return Err(Error::Config(
                "crossfade.progress_interval_ms must be non-zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.crossfade.quick_finish_threshold) {
            return Err(Error::Config(format!(
                "crossfade.quick_finish_threshold {} outside 0.0-1.0",
                self.crossfade.quick_finish_threshold
            )));
        }

        let timeout = &self.load_timeout;
        if timeout.min_ms == 0 || timeout.min_ms > timeout.max_ms {
            return Err(Error::Config(format!(
                "load_timeout bounds invalid: min {} ms, max {} ms",
                timeout.min_ms, timeout.max_ms
            )));
        }
        if !(1.0..=MAX_TIMEOUT_MULTIPLIER).contains(&timeout.multiplier) {
            return Err(Error::Config(format!(
                "load_timeout.multiplier {} outside 1.0-{}",
                timeout.multiplier, MAX_TIMEOUT_MULTIPLIER
            )));
        }
        Ok(())
    }
}

impl CrossfadeConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn rollback(&self) -> Duration {
        Duration::from_millis(self.rollback_ms)
    }

    pub fn quick_finish(&self) -> Duration {
        Duration::from_millis(self.quick_finish_ms)
    }
}

impl LoadTimeoutConfig {
    pub fn initial(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    pub fn min(&self) -> Duration {
        Duration::from_millis(self.min_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

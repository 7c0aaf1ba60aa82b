//! Adaptive load deadline
//!
//! Deadline = clamp(multiplier x EWMA of observed load latencies, min, max).
//! A timed-out load widens the deadline so a slow backend is not starved.

use std::time::Duration;

use crate::config::LoadTimeoutConfig;

/// Weight of the newest sample in the moving average
const SMOOTHING: f64 = 0.3;

/// Deadline growth factor after a timeout
const BACKOFF: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct AdaptiveTimeout {
    estimate: Option<f64>,
    current: Duration,
    min: Duration,
    max: Duration,
    multiplier: f64,
}

impl AdaptiveTimeout {
    pub fn new(config: &LoadTimeoutConfig) -> Self {
        let (min, max) = (config.min(), config.max());
        Self {
            estimate: None,
            current: config.initial().clamp(min, max),
            min,
            max,
            multiplier: config.multiplier,
        }
    }

    /// Deadline for the next load
    pub fn deadline(&self) -> Duration {
        self.current
    }

    /// Smoothed latency estimate, if any load has completed
    pub fn estimate(&self) -> Option<Duration> {
        self.estimate.map(Duration::from_secs_f64)
    }

    pub fn record_success(&mut self, latency: Duration) {
        let sample = latency.as_secs_f64();
        let estimate = match self.estimate {
            Some(previous) => SMOOTHING * sample + (1.0 - SMOOTHING) * previous,
            None => sample,
        };
        self.estimate = Some(estimate);
        self.current = Duration::try_from_secs_f64(estimate * self.multiplier)
            .map_or(self.max, |deadline| deadline.clamp(self.min, self.max));
    }

    pub fn record_timeout(&mut self) {
        self.current = self.current.mul_f64(BACKOFF).clamp(self.min, self.max);
    }
}

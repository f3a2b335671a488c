//! Exponential backoff between polls
//!
//! Pure state, no I/O: given the current delay and a multiplier, the next
//! wait is `current * multiplier`, capped at a maximum. The first returned
//! delay is already `initial * multiplier`; polling never waits a fixed
//! interval. No jitter.

use std::time::Duration;

use crate::config::BackoffConfig;

/// Backoff state for one job's poll loop
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    multiplier: f64,
    max: Duration,
}

impl Backoff {
    /// Create backoff state from a validated config
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            current: config.initial_delay,
            multiplier: config.multiplier,
            max: config.max_delay,
        }
    }

    /// Advance to and return the next wait duration.
    ///
    /// Strictly increasing until the cap is reached, then pinned there.
    /// Growth saturates at the cap, so a huge (but valid) initial delay
    /// cannot overflow `Duration` and panic the poll loop.
    pub fn next_delay(&mut self) -> Duration {
        let secs = self.current.as_secs_f64() * self.multiplier;
        self.current = if secs.is_finite() && secs < self.max.as_secs_f64() {
            Duration::try_from_secs_f64(secs).unwrap_or(self.max)
        } else {
            self.max
        };
        self.current
    }
}

//! Job configuration
//!
//! Scheduling mode, backoff shape, and failure policies are explicit
//! construction parameters. There is no process-global toggle: two jobs in
//! the same process may run in different modes.

use std::time::Duration;

/// How the poll loop is scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollMode {
    /// `start` blocks the calling thread for the entire poll loop and
    /// returns only once terminal
    #[default]
    Synchronous,
    /// `start` returns immediately after submission; polling continues on
    /// a dedicated worker thread with a cancellation handle
    Concurrent,
}

/// What to do when a registered callback returns an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerErrorPolicy {
    /// Stop polling this job; the error is returned from `start` (sync
    /// mode) or `PollWorker::join` (concurrent mode)
    #[default]
    StopJob,
    /// Panic on the polling thread. A programmer mistake in a handler is
    /// made loud: sync mode unwinds to the caller, concurrent mode
    /// surfaces through the worker's join handle.
    Escalate,
}

/// Backoff shape for the poll loop
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Seed delay; the first wait is already `initial_delay * multiplier`
    pub initial_delay: Duration,
    /// Growth factor per poll, must be > 1.0
    pub multiplier: f64,
    /// Hard ceiling on the wait between polls
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Configuration for one job
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Scheduling mode
    pub mode: PollMode,
    /// Backoff shape
    pub backoff: BackoffConfig,
    /// Transient poll failures tolerated before the job gives up
    /// (default: 3). Zero means a single poll failure stops the job.
    pub poll_retries: u32,
    /// Handler failure policy
    pub on_handler_error: HandlerErrorPolicy,
}

impl JobConfig {
    /// Synchronous-mode config with defaults
    pub fn synchronous() -> Self {
        Self {
            mode: PollMode::Synchronous,
            ..Self::default()
        }
    }

    /// Concurrent-mode config with defaults
    pub fn concurrent() -> Self {
        Self {
            mode: PollMode::Concurrent,
            ..Self::default()
        }
    }

    /// Set the backoff shape
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the poll retry budget
    pub fn with_poll_retries(mut self, retries: u32) -> Self {
        self.poll_retries = retries;
        self
    }

    /// Set the handler failure policy
    pub fn with_handler_error_policy(mut self, policy: HandlerErrorPolicy) -> Self {
        self.on_handler_error = policy;
        self
    }

    /// Validate configuration bounds
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.backoff.initial_delay.is_zero() {
            return Err(ConfigValidationError::ZeroInitialDelay);
        }

        if self.backoff.multiplier <= 1.0 || !self.backoff.multiplier.is_finite() {
            return Err(ConfigValidationError::MultiplierOutOfBounds {
                value: self.backoff.multiplier,
            });
        }

        if self.backoff.max_delay < self.backoff.initial_delay {
            return Err(ConfigValidationError::MaxBelowInitial {
                max: self.backoff.max_delay,
                initial: self.backoff.initial_delay,
            });
        }

        Ok(())
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            mode: PollMode::default(),
            backoff: BackoffConfig::default(),
            poll_retries: 3,
            on_handler_error: HandlerErrorPolicy::default(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("initial_delay must be positive")]
    ZeroInitialDelay,

    #[error("multiplier must be a finite value > 1.0, got {value}")]
    MultiplierOutOfBounds { value: f64 },

    #[error("max_delay {max:?} is below initial_delay {initial:?}")]
    MaxBelowInitial { max: Duration, initial: Duration },
}

//! Cancellation handle for concurrent-mode polling
//!
//! The worker suspends only at the backoff wait, so that wait is sliced:
//! the token is re-checked every 50ms, bounding cancellation latency
//! without waking the thread for anything else.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Granularity of the interruptible wait
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Shared cancellation flag for one job's poll worker.
///
/// Clones share the flag; cancelling any clone cancels the worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep for `delay`, waking early if cancelled.
    ///
    /// Returns true if cancellation was observed during (or before) the
    /// wait.
    pub fn wait(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            std::thread::sleep(remaining.min(WAIT_SLICE));
        }
    }
}

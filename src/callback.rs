//! Event callbacks
//!
//! User-supplied handlers keyed by a closed set of event kinds. Each kind
//! holds an ordered list of handlers, initialized empty at construction;
//! registration order is invocation order and the same kind may be
//! registered any number of times. The registry never catches handler
//! errors: `fire` stops at the first failure and propagates it to the
//! poll loop.

use std::sync::Arc;

use crate::job::Job;

/// Error type handlers may return; boxed so callers bring their own
pub type CallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A registered handler. `Arc` so the registry lock can be released
/// before invocation (handlers may re-register or read the job).
pub type Handler = Arc<dyn Fn(&Job) -> Result<(), CallbackError> + Send + Sync + 'static>;

/// The events a job can fire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// After every snapshot refresh, terminal ones included
    Poll,
    /// Once, when the job reaches Succeeded
    Complete,
    /// Once, when the job reaches Failed (or its poll retries run out)
    Error,
}

impl EventKind {
    fn index(self) -> usize {
        match self {
            EventKind::Poll => 0,
            EventKind::Complete => 1,
            EventKind::Error => 2,
        }
    }
}

/// Ordered handler lists, one per event kind
#[derive(Default)]
pub struct CallbackRegistry {
    handlers: [Vec<Handler>; 3],
}

impl CallbackRegistry {
    /// Create a registry with every kind empty
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for the given kind
    pub fn register(&mut self, kind: EventKind, handler: Handler) {
        self.handlers[kind.index()].push(handler);
    }

    /// Number of handlers registered for a kind
    pub fn count(&self, kind: EventKind) -> usize {
        self.handlers[kind.index()].len()
    }

    /// Clone out the handler list for a kind.
    ///
    /// The poll loop fires from a snapshot taken under the registry lock,
    /// then invokes with the lock released, so a handler may register
    /// further callbacks without deadlocking. Handlers registered while an
    /// occurrence is being fired are not invoked for that occurrence.
    pub fn snapshot(&self, kind: EventKind) -> Vec<Handler> {
        self.handlers[kind.index()].clone()
    }

    /// Invoke every handler for `kind` in registration order, passing the
    /// job. Stops at and propagates the first handler error.
    pub fn fire(&self, kind: EventKind, job: &Job) -> Result<(), CallbackError> {
        for handler in &self.handlers[kind.index()] {
            handler(job)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("poll", &self.count(EventKind::Poll))
            .field("complete", &self.count(EventKind::Complete))
            .field("error", &self.count(EventKind::Error))
            .finish()
    }
}

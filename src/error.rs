//! Crate error taxonomy
//!
//! Submission failures are retryable (the job stays NotStarted); everything
//! else stops the job. Concurrent-mode callers see these through
//! `PollWorker::join` and `on_error` handlers, synchronous-mode callers at
//! the `start` call site.

use crate::archive::ArchiveError;
use crate::callback::CallbackError;
use crate::config::ConfigValidationError;
use crate::gateway::{PollError, SubmitError};
use crate::job::RunState;
use crate::snapshot::OperationState;

/// Errors surfaced by the job state machine
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Invalid job configuration: {0}")]
    Config(#[from] ConfigValidationError),

    #[error("Job already started (run state: {state})")]
    AlreadyStarted { state: RunState },

    #[error("Job has not been submitted yet")]
    NotStarted,

    #[error("Submission failed: {0}")]
    Submit(#[from] SubmitError),

    #[error("Poll failed: {0}")]
    Poll(#[from] PollError),

    #[error("Polling gave up after {attempts} failed attempts: {source}")]
    PollRetriesExhausted { attempts: u32, source: PollError },

    #[error("Callback handler failed: {0}")]
    Handler(CallbackError),

    #[error("No result payload present (job state: {state})")]
    NoPayload { state: OperationState },

    #[error("Result archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Failed to spawn poll worker: {0}")]
    Spawn(std::io::Error),

    #[error("Poll worker panicked")]
    WorkerPanicked,
}

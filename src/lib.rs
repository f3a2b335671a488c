//! mdlane - client-side coordinator for long-running metadata operations
//!
//! A caller submits a deploy- or retrieve-style operation through a
//! [`Gateway`], gets back an opaque job id, and a [`Job`] polls that id
//! with exponential backoff until the operation reaches a terminal state,
//! firing registered callbacks along the way and exposing the result
//! payload (including unpacking a base64-encoded archive result).

pub mod archive;
pub mod backoff;
pub mod callback;
pub mod cancel;
pub mod config;
pub mod error;
pub mod gateway;
pub mod job;
pub mod mock;
pub mod snapshot;

pub use callback::{CallbackError, EventKind};
pub use cancel::CancelToken;
pub use config::{BackoffConfig, HandlerErrorPolicy, JobConfig, PollMode};
pub use error::JobError;
pub use gateway::{Gateway, JobId, OperationKind, OperationRequest, PollError, SubmitError};
pub use job::{Job, PollWorker, RunState, Started};
pub use mock::MockGateway;
pub use snapshot::{DeployDetail, DeployProblem, OperationState, ResultPayload, StatusSnapshot};

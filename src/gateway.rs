//! Remote operation gateway contract
//!
//! The gateway is the external collaborator that actually talks to the
//! metadata service: it accepts an operation submission and answers status
//! polls for the returned job identifier. Wire-format construction,
//! authentication, and transport live behind this trait and are out of
//! scope for the crate.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::snapshot::StatusSnapshot;

/// Opaque server-assigned job identifier.
///
/// Treated as a token: callers never parse it, only hand it back on polls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

/// Kind of long-running operation to submit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Push metadata to the service; terminal payload is structured
    /// deploy detail
    Deploy,
    /// Pull metadata from the service; terminal payload is a
    /// base64-encoded archive
    Retrieve,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Deploy => write!(f, "deploy"),
            OperationKind::Retrieve => write!(f, "retrieve"),
        }
    }
}

/// One operation submission: the kind plus its free-form parameters.
///
/// Parameters are carried as a JSON value so the gateway owns their wire
/// shape; the core never inspects them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRequest {
    /// Operation to perform
    pub kind: OperationKind,
    /// Operation-specific parameters, opaque to the core
    #[serde(default)]
    pub params: Value,
}

impl OperationRequest {
    /// Create a request with the given kind and parameters
    pub fn new(kind: OperationKind, params: Value) -> Self {
        Self { kind, params }
    }

    /// Create a request with no parameters
    pub fn bare(kind: OperationKind) -> Self {
        Self {
            kind,
            params: Value::Null,
        }
    }
}

/// Submission failure: the gateway rejected or failed the initial request.
///
/// The job stays NotStarted after any of these; `start` may be retried.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Gateway rejected {kind} submission: {reason}")]
    Rejected { kind: OperationKind, reason: String },

    #[error("Transport failure during submission: {0}")]
    Transport(String),

    #[error("Malformed submission response: {0}")]
    InvalidResponse(String),
}

/// Failure of a single poll attempt
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Unknown job id {0}")]
    UnknownJob(JobId),

    #[error("Transport failure while polling: {0}")]
    Transport(String),

    #[error("Malformed status response: {0}")]
    InvalidResponse(String),
}

/// The remote operation gateway.
///
/// Implementations must be safe for concurrent use: multiple jobs polling
/// on independent worker threads share one gateway.
pub trait Gateway: Send + Sync {
    /// Submit an operation, returning the server-assigned job identifier
    fn submit(&self, request: &OperationRequest) -> Result<JobId, SubmitError>;

    /// Fetch the current status of a previously submitted job
    fn poll(&self, id: &JobId) -> Result<StatusSnapshot, PollError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_serializes_transparently() {
        let id = JobId::from("700x1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"700x1\"");

        let back: JobId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn operation_kind_wire_names_are_lowercase() {
        assert_eq!(
            serde_json::to_string(&OperationKind::Deploy).unwrap(),
            "\"deploy\""
        );
        assert_eq!(
            serde_json::to_string(&OperationKind::Retrieve).unwrap(),
            "\"retrieve\""
        );
    }

    #[test]
    fn bare_request_has_null_params() {
        let request = OperationRequest::bare(OperationKind::Retrieve);
        assert!(request.params.is_null());
    }
}

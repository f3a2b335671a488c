//! Status snapshots
//!
//! A snapshot is one immutable read of a job's server-side status at a poll
//! instant. The job caches at most one snapshot at a time; older snapshots
//! are discarded, never retained.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-side operation state.
///
/// Exactly four values, case-sensitive over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationState {
    /// Accepted, not yet picked up
    Pending,
    /// Actively executing
    InProgress,
    /// Completed successfully
    Succeeded,
    /// Completed with failure
    Failed,
}

impl OperationState {
    /// Returns true if this state ends polling
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Succeeded | OperationState::Failed)
    }

    /// Returns the wire representation of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Pending => "Pending",
            OperationState::InProgress => "InProgress",
            OperationState::Succeeded => "Succeeded",
            OperationState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One component-level problem reported by a failed or partial deploy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployProblem {
    /// Path of the component that failed
    pub file_name: String,
    /// Human-readable failure description
    pub problem: String,
}

/// Structured result detail for deploy operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployDetail {
    /// Whether the deploy as a whole succeeded
    pub success: bool,
    /// Components the server attempted to deploy
    pub components_total: u32,
    /// Components that failed
    pub components_failed: u32,
    /// Per-component problems (empty on full success)
    #[serde(default)]
    pub problems: Vec<DeployProblem>,
}

/// Terminal result payload.
///
/// Retrieve-style jobs carry a base64-encoded archive; deploy-style jobs
/// carry structured detail. Untagged on the wire: a bare string is an
/// archive, an object is deploy detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultPayload {
    /// base64-encoded tar archive (retrieve)
    Archive(String),
    /// Structured deploy result (deploy)
    Deploy(DeployDetail),
}

impl ResultPayload {
    /// Returns the base64 archive text, if this payload is one
    pub fn archive_base64(&self) -> Option<&str> {
        match self {
            ResultPayload::Archive(b64) => Some(b64),
            ResultPayload::Deploy(_) => None,
        }
    }

    /// Returns the deploy detail, if this payload is one
    pub fn deploy_detail(&self) -> Option<&DeployDetail> {
        match self {
            ResultPayload::Archive(_) => None,
            ResultPayload::Deploy(detail) => Some(detail),
        }
    }
}

/// Immutable status of a job at one poll instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Whether the server considers the job finished
    pub done: bool,
    /// Current server-side state
    pub state: OperationState,
    /// Result payload; present only once terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<ResultPayload>,
    /// When this snapshot was taken (host clock)
    #[serde(default = "Utc::now")]
    pub polled_at: DateTime<Utc>,
}

impl StatusSnapshot {
    /// Build a non-terminal snapshot in the given state
    pub fn in_flight(state: OperationState) -> Self {
        Self {
            done: false,
            state,
            payload: None,
            polled_at: Utc::now(),
        }
    }

    /// Build a terminal snapshot with an optional payload
    pub fn terminal(state: OperationState, payload: Option<ResultPayload>) -> Self {
        Self {
            done: true,
            state,
            payload,
            polled_at: Utc::now(),
        }
    }

    /// Synthetic snapshot cached when poll retries are exhausted.
    ///
    /// Lets accessors and `on_error` handlers observe a terminal Failed
    /// state even though the server never reported one.
    pub fn transport_failure() -> Self {
        Self::terminal(OperationState::Failed, None)
    }

    /// Returns true if the state ends polling
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

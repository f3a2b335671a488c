//! Mock gateway
//!
//! Configurable in-crate gateway for exercising the full job lifecycle
//! without a live service: scripted poll sequences, submission failure
//! injection, and call counting so tests can assert exactly how many
//! gateway round-trips happened.

use std::collections::VecDeque;
use std::sync::Mutex;

use uuid::Uuid;

use crate::archive;
use crate::gateway::{Gateway, JobId, OperationRequest, PollError, SubmitError};
use crate::snapshot::{ResultPayload, StatusSnapshot};

/// One scripted poll outcome
#[derive(Debug, Clone)]
enum PollScript {
    Snapshot(StatusSnapshot),
    Failure(String),
}

#[derive(Debug, Default)]
struct MockState {
    /// Submissions left to fail before one succeeds
    submit_failures: u32,
    submit_failure_message: String,
    /// Scripted poll outcomes, consumed front to back
    polls: VecDeque<PollScript>,
    /// Last scripted snapshot; replayed once the script runs out, the way
    /// a real service keeps answering for a finished job
    last_snapshot: Option<StatusSnapshot>,
    assigned_id: Option<JobId>,
    last_request: Option<OperationRequest>,
    submit_calls: u32,
    poll_calls: u32,
}

/// Scriptable gateway for tests
#[derive(Debug, Default)]
pub struct MockGateway {
    /// Id to assign on submission; a fresh v4 uuid when unset
    job_id: Option<String>,
    state: Mutex<MockState>,
}

impl MockGateway {
    /// Gateway that assigns a random job id and has no scripted polls
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a fixed job id on submission
    pub fn with_job_id(mut self, id: impl Into<String>) -> Self {
        self.job_id = Some(id.into());
        self
    }

    /// Fail the next `count` submissions with the given message
    pub fn fail_submissions(self, count: u32, message: impl Into<String>) -> Self {
        {
            let mut state = self.lock();
            state.submit_failures = count;
            state.submit_failure_message = message.into();
        }
        self
    }

    /// Script the next poll to return this snapshot
    pub fn enqueue_status(&self, snapshot: StatusSnapshot) {
        self.lock().polls.push_back(PollScript::Snapshot(snapshot));
    }

    /// Script the next poll to fail with a transport error
    pub fn enqueue_poll_failure(&self, message: impl Into<String>) {
        self.lock().polls.push_back(PollScript::Failure(message.into()));
    }

    /// Number of submissions attempted
    pub fn submit_calls(&self) -> u32 {
        self.lock().submit_calls
    }

    /// Number of polls answered (failures included)
    pub fn poll_calls(&self) -> u32 {
        self.lock().poll_calls
    }

    /// The request from the most recent submission
    pub fn last_request(&self) -> Option<OperationRequest> {
        self.lock().last_request.clone()
    }

    /// Build the base64 archive payload a retrieve result would carry,
    /// from (entry name, contents) pairs.
    pub fn archive_payload(entries: &[(&str, &[u8])]) -> ResultPayload {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, *contents)
                .expect("in-memory tar build cannot fail");
        }
        let bytes = builder.into_inner().expect("in-memory tar build cannot fail");
        ResultPayload::Archive(archive::encode_base64(&bytes))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Gateway for MockGateway {
    fn submit(&self, request: &OperationRequest) -> Result<JobId, SubmitError> {
        let mut state = self.lock();
        state.submit_calls += 1;
        state.last_request = Some(request.clone());

        if state.submit_failures > 0 {
            state.submit_failures -= 1;
            return Err(SubmitError::Transport(state.submit_failure_message.clone()));
        }

        let id = JobId(
            self.job_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        );
        state.assigned_id = Some(id.clone());
        Ok(id)
    }

    fn poll(&self, id: &JobId) -> Result<StatusSnapshot, PollError> {
        let mut state = self.lock();
        state.poll_calls += 1;

        if state.assigned_id.as_ref() != Some(id) {
            return Err(PollError::UnknownJob(id.clone()));
        }

        match state.polls.pop_front() {
            Some(PollScript::Snapshot(snapshot)) => {
                state.last_snapshot = Some(snapshot.clone());
                Ok(snapshot)
            }
            Some(PollScript::Failure(message)) => Err(PollError::Transport(message)),
            None => state
                .last_snapshot
                .clone()
                .ok_or_else(|| PollError::InvalidResponse("no scripted status".to_string())),
        }
    }
}

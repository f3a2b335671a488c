//! Job state machine
//!
//! A `Job` coordinates one long-running remote operation: it submits the
//! operation through a gateway, polls the returned job id with exponential
//! backoff until a terminal state, caches the latest status snapshot, and
//! fires registered callbacks along the way.
//!
//! Run states: NotStarted → Polling → Stopped. The job id is set at most
//! once, exactly when submission succeeds; polling never begins before it
//! is set. A job is not reusable after Stopped.
//!
//! `Job` is a cheap-to-clone handle over shared state, so callbacks receive
//! the same job they were registered on and concurrent-mode callers keep a
//! live view while the worker polls.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::JoinHandle;

use crate::archive::{self, ArchiveError};
use crate::backoff::Backoff;
use crate::callback::{CallbackError, CallbackRegistry, EventKind, Handler};
use crate::cancel::CancelToken;
use crate::config::{HandlerErrorPolicy, JobConfig, PollMode};
use crate::error::JobError;
use crate::gateway::{Gateway, JobId, OperationRequest};
use crate::snapshot::{OperationState, StatusSnapshot};

/// Where the job is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Created; submission has not succeeded yet
    NotStarted,
    /// Submitted; the poll loop is running
    Polling,
    /// The poll loop ended: terminal snapshot, cancellation, or a
    /// propagated error
    Stopped,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::NotStarted => write!(f, "not started"),
            RunState::Polling => write!(f, "polling"),
            RunState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Outcome of `Job::start`
pub enum Started {
    /// Synchronous mode: the poll loop ran to a terminal snapshot before
    /// returning
    Finished,
    /// Concurrent mode: polling continues on the returned worker
    Background(PollWorker),
}

/// Handle to a concurrent-mode poll worker: the cancellation token plus
/// the thread's join handle.
///
/// Dropping the worker without joining detaches the thread; any error it
/// hits is then only observable through `on_error` handlers. Join to get
/// the loop's result explicitly.
pub struct PollWorker {
    cancel: CancelToken,
    handle: JoinHandle<Result<(), JobError>>,
}

impl PollWorker {
    /// Request cancellation. The worker stops at its next wait slice
    /// without firing terminal events.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A clone of the worker's cancellation token
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Whether the worker thread has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker and return the poll loop's result
    pub fn join(self) -> Result<(), JobError> {
        self.handle.join().map_err(|_| JobError::WorkerPanicked)?
    }
}

struct JobInner {
    gateway: Arc<dyn Gateway>,
    request: OperationRequest,
    config: JobConfig,
    /// Set at most once, when submission succeeds
    id: OnceLock<JobId>,
    /// Latest snapshot; invalidated at the start of every poll cycle
    snapshot: Mutex<Option<StatusSnapshot>>,
    callbacks: Mutex<CallbackRegistry>,
    run_state: Mutex<RunState>,
    cancel: CancelToken,
}

/// Coordinator for one long-running remote operation
#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

/// Recover the guard even if a handler panicked while holding the lock
/// (possible under `HandlerErrorPolicy::Escalate`).
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Job {
    /// Create a job bound to a gateway and operation request.
    ///
    /// Validates the configuration; the job starts NotStarted and nothing
    /// touches the gateway until `start`.
    pub fn new(
        gateway: Arc<dyn Gateway>,
        request: OperationRequest,
        config: JobConfig,
    ) -> Result<Self, JobError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(JobInner {
                gateway,
                request,
                config,
                id: OnceLock::new(),
                snapshot: Mutex::new(None),
                callbacks: Mutex::new(CallbackRegistry::new()),
                run_state: Mutex::new(RunState::NotStarted),
                cancel: CancelToken::new(),
            }),
        })
    }

    /// The server-assigned job id, once submission has succeeded
    pub fn id(&self) -> Option<&JobId> {
        self.inner.id.get()
    }

    /// True iff submission has succeeded
    pub fn is_started(&self) -> bool {
        self.inner.id.get().is_some()
    }

    /// The operation request this job was built with
    pub fn request(&self) -> &OperationRequest {
        &self.inner.request
    }

    /// Current lifecycle state
    pub fn run_state(&self) -> RunState {
        *lock(&self.inner.run_state)
    }

    // === Callback registration ===

    /// Register a handler fired after every snapshot refresh, terminal
    /// ones included. Fluent; callable before or after `start`.
    pub fn on_poll<F>(&self, handler: F) -> &Self
    where
        F: Fn(&Job) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.register(EventKind::Poll, Arc::new(handler))
    }

    /// Register a handler fired once when the job reaches Succeeded
    pub fn on_complete<F>(&self, handler: F) -> &Self
    where
        F: Fn(&Job) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.register(EventKind::Complete, Arc::new(handler))
    }

    /// Register a handler fired once when the job reaches Failed or runs
    /// out of poll retries
    pub fn on_error<F>(&self, handler: F) -> &Self
    where
        F: Fn(&Job) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.register(EventKind::Error, Arc::new(handler))
    }

    fn register(&self, kind: EventKind, handler: Handler) -> &Self {
        lock(&self.inner.callbacks).register(kind, handler);
        self
    }

    // === Lifecycle ===

    /// Submit the operation and begin polling.
    ///
    /// Submission happens synchronously in both modes; on `SubmitError`
    /// the job stays NotStarted and `start` may be retried. Calling
    /// `start` on a Polling or Stopped job is an error
    /// (`JobError::AlreadyStarted`), never a silent no-op.
    ///
    /// Synchronous mode blocks until a terminal snapshot (or a propagated
    /// poll/handler error) and returns `Started::Finished`. Concurrent
    /// mode returns `Started::Background` immediately after submission;
    /// the worker's errors surface through `PollWorker::join` and
    /// `on_error`.
    pub fn start(&self) -> Result<Started, JobError> {
        {
            let mut run_state = lock(&self.inner.run_state);
            if *run_state != RunState::NotStarted {
                return Err(JobError::AlreadyStarted { state: *run_state });
            }

            // Submit while holding the run-state lock so two racing
            // `start` calls cannot both submit.
            let id = self.inner.gateway.submit(&self.inner.request)?;
            let _ = self.inner.id.set(id);
            *run_state = RunState::Polling;
        }

        match self.inner.config.mode {
            PollMode::Synchronous => {
                self.poll_loop()?;
                Ok(Started::Finished)
            }
            PollMode::Concurrent => {
                let job = self.clone();
                let thread_name = format!("mdlane-poll-{}", self.inner.id.get().map(JobId::as_str).unwrap_or("?"));
                let handle = std::thread::Builder::new()
                    .name(thread_name)
                    .spawn(move || job.poll_loop())
                    .map_err(JobError::Spawn)?;
                Ok(Started::Background(PollWorker {
                    cancel: self.inner.cancel.clone(),
                    handle,
                }))
            }
        }
    }

    /// The poll loop. One cycle: invalidate cache, wait the next backoff
    /// delay, poll, cache, fire Poll, fire the terminal event if done.
    /// No two cycles overlap for one job.
    fn poll_loop(&self) -> Result<(), JobError> {
        let mut backoff = Backoff::new(&self.inner.config.backoff);
        let mut failures: u32 = 0;

        loop {
            // 1. Invalidate the cached snapshot for this cycle
            *lock(&self.inner.snapshot) = None;

            // 2. Wait; cancellation stops the job without terminal events
            if self.inner.cancel.wait(backoff.next_delay()) {
                self.stop();
                return Ok(());
            }

            // 3. Poll and cache. Transient failures retry on the same
            // backoff progression, up to the configured budget.
            let id = self.inner.id.get().ok_or(JobError::NotStarted)?;
            let snapshot = match self.inner.gateway.poll(id) {
                Ok(snapshot) => {
                    failures = 0;
                    snapshot
                }
                Err(err) => {
                    failures += 1;
                    if failures <= self.inner.config.poll_retries {
                        continue;
                    }
                    // Budget exhausted: cache a synthetic Failed snapshot
                    // so accessors and handlers see a terminal state, fire
                    // Error, and still return the transport error so the
                    // failure is never observable only through an
                    // optionally-registered handler.
                    *lock(&self.inner.snapshot) = Some(StatusSnapshot::transport_failure());
                    let fired = self.fire(EventKind::Error);
                    self.stop();
                    if let Err(handler_err) = fired {
                        return self.handler_failure(handler_err);
                    }
                    return Err(JobError::PollRetriesExhausted {
                        attempts: failures,
                        source: err,
                    });
                }
            };

            let state = snapshot.state;
            *lock(&self.inner.snapshot) = Some(snapshot);

            // 4. Fire Poll for every refresh, terminal ones included
            if let Err(handler_err) = self.fire(EventKind::Poll) {
                self.stop();
                return self.handler_failure(handler_err);
            }

            // 5. Terminal state ends the loop after its event fires
            if state.is_terminal() {
                let kind = if state == OperationState::Succeeded {
                    EventKind::Complete
                } else {
                    EventKind::Error
                };
                let fired = self.fire(kind);
                self.stop();
                if let Err(handler_err) = fired {
                    return self.handler_failure(handler_err);
                }
                return Ok(());
            }
        }
    }

    /// Fire every handler for `kind`, in registration order, with the
    /// registry lock released during invocation so handlers may register
    /// further callbacks or read the job.
    fn fire(&self, kind: EventKind) -> Result<(), CallbackError> {
        let handlers = lock(&self.inner.callbacks).snapshot(kind);
        for handler in handlers {
            handler(self)?;
        }
        Ok(())
    }

    fn handler_failure(&self, err: CallbackError) -> Result<(), JobError> {
        match self.inner.config.on_handler_error {
            HandlerErrorPolicy::StopJob => Err(JobError::Handler(err)),
            HandlerErrorPolicy::Escalate => panic!("callback handler failed: {err}"),
        }
    }

    fn stop(&self) {
        *lock(&self.inner.run_state) = RunState::Stopped;
    }

    // === Status accessors ===

    /// The latest status snapshot.
    ///
    /// A passive read: returns the cached snapshot, fetching one from the
    /// gateway only if none is cached yet. Never advances the backoff,
    /// never fires events. This is also the result accessor: result and
    /// status share the one cached fetch.
    pub fn status(&self) -> Result<StatusSnapshot, JobError> {
        if let Some(snapshot) = lock(&self.inner.snapshot).clone() {
            return Ok(snapshot);
        }

        let id = self.inner.id.get().ok_or(JobError::NotStarted)?;
        let fresh = self.inner.gateway.poll(id)?;

        // Keep whichever snapshot got cached first if a poll cycle raced us
        let mut cache = lock(&self.inner.snapshot);
        Ok(cache.get_or_insert(fresh).clone())
    }

    /// Whether the server considers the job finished
    pub fn is_done(&self) -> Result<bool, JobError> {
        Ok(self.status()?.done)
    }

    /// Current server-side state
    pub fn state(&self) -> Result<OperationState, JobError> {
        Ok(self.status()?.state)
    }

    /// True iff the current state is Pending
    pub fn is_pending(&self) -> Result<bool, JobError> {
        Ok(self.state()? == OperationState::Pending)
    }

    /// True iff the current state is InProgress
    pub fn is_in_progress(&self) -> Result<bool, JobError> {
        Ok(self.state()? == OperationState::InProgress)
    }

    /// True iff the current state is Succeeded
    pub fn is_succeeded(&self) -> Result<bool, JobError> {
        Ok(self.state()? == OperationState::Succeeded)
    }

    /// True iff the current state is Failed
    pub fn is_failed(&self) -> Result<bool, JobError> {
        Ok(self.state()? == OperationState::Failed)
    }

    // === Result payload ===

    /// Decode the base64 archive payload of the current snapshot.
    ///
    /// Errors if no terminal snapshot with a payload exists yet, or if the
    /// payload is structured deploy detail rather than an archive.
    pub fn archive_bytes(&self) -> Result<Vec<u8>, JobError> {
        let snapshot = self.status()?;
        let payload = snapshot.payload.ok_or(JobError::NoPayload {
            state: snapshot.state,
        })?;
        let b64 = payload
            .archive_base64()
            .ok_or(JobError::Archive(ArchiveError::NotAnArchive))?;
        Ok(archive::decode_base64(b64)?)
    }

    /// Extract the result archive under `dest`.
    ///
    /// Safe to call before the job has completed (even before `start`): if
    /// no terminal snapshot exists yet, the call defers itself by
    /// registering an `on_complete` handler that re-invokes it, so
    /// extraction happens exactly once, after completion. Once a terminal
    /// snapshot with a payload exists, the decoded archive is unpacked
    /// entry by entry under `dest`, overwriting existing files; entry
    /// names are used verbatim (no path-traversal sanitization; point
    /// this at gateways you trust).
    ///
    /// A job stopped by cancellation never reaches Complete, so a
    /// deferred extraction registered on it never runs.
    pub fn extract_to<P: AsRef<Path>>(&self, dest: P) -> Result<(), JobError> {
        let have_terminal = lock(&self.inner.snapshot)
            .as_ref()
            .map(StatusSnapshot::is_terminal)
            .unwrap_or(false);

        if !have_terminal {
            let deferred: PathBuf = dest.as_ref().to_path_buf();
            self.on_complete(move |job| {
                job.extract_to(&deferred)?;
                Ok(())
            });

            // The terminal snapshot may land between the read above and
            // the registration, in which case the Complete firing can
            // miss the new handler. Re-check and extract directly;
            // overwrite semantics make a rare double extraction
            // idempotent.
            let now_terminal = lock(&self.inner.snapshot)
                .as_ref()
                .map(StatusSnapshot::is_terminal)
                .unwrap_or(false);
            if !now_terminal {
                return Ok(());
            }
        }

        let bytes = self.archive_bytes()?;
        archive::extract(&bytes, dest.as_ref())?;
        Ok(())
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.inner.id.get())
            .field("kind", &self.inner.request.kind)
            .field("run_state", &self.run_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::OperationKind;
    use crate::mock::MockGateway;

    fn job_with(gateway: MockGateway, config: JobConfig) -> Job {
        Job::new(
            Arc::new(gateway),
            OperationRequest::bare(OperationKind::Retrieve),
            config,
        )
        .unwrap()
    }

    #[test]
    fn new_job_is_not_started() {
        let job = job_with(MockGateway::new(), JobConfig::default());
        assert!(!job.is_started());
        assert_eq!(job.run_state(), RunState::NotStarted);
        assert!(job.id().is_none());
    }

    #[test]
    fn status_before_start_errors() {
        let job = job_with(MockGateway::new(), JobConfig::default());
        assert!(matches!(job.status(), Err(JobError::NotStarted)));
        assert!(matches!(job.archive_bytes(), Err(JobError::NotStarted)));
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let config = JobConfig::default().with_backoff(crate::config::BackoffConfig {
            multiplier: 0.5,
            ..Default::default()
        });
        let result = Job::new(
            Arc::new(MockGateway::new()),
            OperationRequest::bare(OperationKind::Deploy),
            config,
        );
        assert!(matches!(result, Err(JobError::Config(_))));
    }

    #[test]
    fn registration_is_fluent_and_counts() {
        let job = job_with(MockGateway::new(), JobConfig::default());
        job.on_poll(|_| Ok(()))
            .on_poll(|_| Ok(()))
            .on_complete(|_| Ok(()))
            .on_error(|_| Ok(()));

        let callbacks = job.inner.callbacks.lock().unwrap();
        assert_eq!(callbacks.count(EventKind::Poll), 2);
        assert_eq!(callbacks.count(EventKind::Complete), 1);
        assert_eq!(callbacks.count(EventKind::Error), 1);
    }
}

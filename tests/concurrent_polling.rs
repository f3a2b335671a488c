//! Concurrent-mode tests: background workers, cancellation, passive status
//! reads during a backoff wait, and error surfacing through the join
//! handle.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mdlane::{
    BackoffConfig, HandlerErrorPolicy, Job, JobConfig, JobError, MockGateway, OperationKind,
    OperationRequest, OperationState, PollWorker, RunState, Started, StatusSnapshot,
};

fn concurrent_config(initial_ms: u64) -> JobConfig {
    JobConfig::concurrent().with_backoff(BackoffConfig {
        initial_delay: Duration::from_millis(initial_ms),
        multiplier: 2.0,
        max_delay: Duration::from_secs(60),
    })
}

fn retrieve_job(gateway: MockGateway, config: JobConfig) -> (Job, Arc<MockGateway>) {
    let gateway = Arc::new(gateway);
    let job = Job::new(
        Arc::clone(&gateway) as Arc<dyn mdlane::Gateway>,
        OperationRequest::bare(OperationKind::Retrieve),
        config,
    )
    .unwrap();
    (job, gateway)
}

fn background(job: &Job) -> PollWorker {
    match job.start().unwrap() {
        Started::Background(worker) => worker,
        Started::Finished => panic!("concurrent mode must not finish inline"),
    }
}

#[test]
fn start_returns_immediately_and_the_worker_finishes_the_job() {
    let gateway = MockGateway::new();
    gateway.enqueue_status(StatusSnapshot::in_flight(OperationState::InProgress));
    gateway.enqueue_status(StatusSnapshot::terminal(OperationState::Succeeded, None));

    let (job, gateway) = retrieve_job(gateway, concurrent_config(200));
    let completes = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&completes);
    job.on_complete(move |_job| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let begun = Instant::now();
    let worker = background(&job);
    assert!(
        begun.elapsed() < Duration::from_millis(100),
        "start must return after submission, before the first wait"
    );
    assert!(job.is_started());

    worker.join().unwrap();

    assert_eq!(job.run_state(), RunState::Stopped);
    assert!(job.is_succeeded().unwrap());
    assert_eq!(completes.load(Ordering::SeqCst), 1);
    assert_eq!(gateway.poll_calls(), 2);
}

#[test]
fn cancellation_stops_the_worker_without_terminal_events() {
    // Long initial delay keeps the worker parked at the backoff wait
    let (job, gateway) = retrieve_job(MockGateway::new(), concurrent_config(10_000));
    let events = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&events);
    job.on_complete(move |_job| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let counter = Arc::clone(&events);
    job.on_error(move |_job| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let worker = background(&job);
    worker.cancel();
    worker.join().unwrap();

    assert_eq!(job.run_state(), RunState::Stopped);
    assert_eq!(events.load(Ordering::SeqCst), 0, "cancellation fires nothing");
    assert_eq!(gateway.poll_calls(), 0, "cancelled before the first poll");
}

#[test]
fn cancel_token_clone_cancels_the_worker() {
    let (job, _gateway) = retrieve_job(MockGateway::new(), concurrent_config(10_000));

    let worker = background(&job);
    let token = worker.cancel_token();
    token.cancel();

    worker.join().unwrap();
    assert_eq!(job.run_state(), RunState::Stopped);
}

#[test]
fn status_during_the_backoff_wait_is_a_passive_read() {
    let gateway = MockGateway::new();
    gateway.enqueue_status(StatusSnapshot::in_flight(OperationState::Pending));

    let (job, gateway) = retrieve_job(gateway, concurrent_config(10_000));
    let polls_fired = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&polls_fired);
    job.on_poll(move |_job| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let worker = background(&job);
    // Let the worker invalidate the cache and park in its first wait
    std::thread::sleep(Duration::from_millis(100));

    // These reads fetch once, then hit the cache.
    assert!(job.is_pending().unwrap());
    assert!(!job.is_done().unwrap());
    assert_eq!(gateway.poll_calls(), 1);
    assert_eq!(
        polls_fired.load(Ordering::SeqCst),
        0,
        "passive reads never fire on_poll"
    );

    worker.cancel();
    worker.join().unwrap();
}

#[test]
fn worker_errors_surface_through_join() {
    let gateway = MockGateway::new();
    gateway.enqueue_poll_failure("connection refused");

    let (job, _gateway) = retrieve_job(gateway, concurrent_config(1).with_poll_retries(0));
    let errors = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&errors);
    job.on_error(move |_job| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let worker = background(&job);
    let result = worker.join();

    assert!(matches!(
        result,
        Err(JobError::PollRetriesExhausted { attempts: 1, .. })
    ));
    assert_eq!(errors.load(Ordering::SeqCst), 1, "on_error fired as well");
}

#[test]
fn escalate_policy_surfaces_as_a_worker_panic_at_join() {
    let gateway = MockGateway::new();
    gateway.enqueue_status(StatusSnapshot::in_flight(OperationState::InProgress));

    let config = concurrent_config(1).with_handler_error_policy(HandlerErrorPolicy::Escalate);
    let (job, _gateway) = retrieve_job(gateway, config);
    job.on_poll(|_job| Err("handler bug".into()));

    let worker = background(&job);

    assert!(matches!(worker.join(), Err(JobError::WorkerPanicked)));
    assert_eq!(job.run_state(), RunState::Stopped);
}

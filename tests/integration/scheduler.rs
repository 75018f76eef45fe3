//! Scheduler integration tests.
//!
//! Tests that verify registration semantics, overlap handling and graceful
//! shutdown on a live scheduler.

use async_trait::async_trait;
use harbormaster::testing::{CountingHandler, RecordingHandler};
use harbormaster::{
    Event, EventBus, Job, JobContext, JobError, JobHandler, JobName, JobRegistry, Schedule,
    Scheduler, SchedulerState,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::common::wait_until;

fn every(ms: u64) -> Schedule {
    Schedule::every(Duration::from_millis(ms)).unwrap()
}

/// Handler that ignores cancellation and sleeps for a fixed time.
struct StubbornHandler {
    delay: Duration,
    finished: AtomicBool,
}

impl StubbornHandler {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            finished: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl JobHandler for StubbornHandler {
    async fn run(&self, _ctx: JobContext) -> Result<(), JobError> {
        tokio::time::sleep(self.delay).await;
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_repeated_registration_leaves_one_timer() {
    let handler = Arc::new(CountingHandler::new());
    let (handle, _task) = Scheduler::new().start().unwrap();
    let registry: &dyn JobRegistry = &handle;

    for _ in 0..5 {
        registry
            .register_job(Job::new("poll", every(50), handler.clone()), false)
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(275)).await;
    handle.shutdown().await.unwrap();

    // A single timer fires about 5 times in this window; five timers would fire ~25.
    assert!(handler.calls() >= 3, "got {} calls", handler.calls());
    assert!(handler.calls() <= 7, "got {} calls", handler.calls());
}

#[tokio::test]
async fn test_concurrent_registration_from_many_tasks() {
    let handler = Arc::new(CountingHandler::new());
    let (handle, _task) = Scheduler::new().start().unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let handle = handle.clone();
        let handler = handler.clone();
        tasks.push(tokio::spawn(async move {
            handle
                .register_job(Job::new("sync", every(60), handler), false)
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let jobs = handle.jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);

    tokio::time::sleep(Duration::from_millis(250)).await;
    handle.shutdown().await.unwrap();
    assert!(handler.calls() <= 6, "got {} calls", handler.calls());
}

#[tokio::test]
async fn test_overlap_is_dropped_not_queued() {
    let handler = Arc::new(CountingHandler::new().with_delay(Duration::from_millis(150)));
    let recorder = Arc::new(RecordingHandler::new());
    let bus = Arc::new(EventBus::new());
    bus.register(recorder.clone()).await;

    let (handle, _task) = Scheduler::new().with_event_bus(bus).start().unwrap();
    handle
        .register_job(Job::new("slow", every(25), handler.clone()), true)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    handle.shutdown().await.unwrap();

    assert_eq!(handler.max_concurrent(), 1);
    let started = recorder
        .count(|e| matches!(e, Event::JobStarted { .. }))
        .await;
    let skipped = recorder
        .count(|e| matches!(e, Event::JobTickSkipped { .. }))
        .await;
    assert!(started <= 3, "got {} invocations", started);
    assert!(skipped >= 5, "got {} skipped ticks", skipped);
}

#[tokio::test]
async fn test_reregistration_while_running_does_not_overlap() {
    let handler = Arc::new(CountingHandler::new().with_delay(Duration::from_millis(200)));
    let (handle, _task) = Scheduler::new().start().unwrap();

    handle
        .register_job(Job::new("sync", every(60_000), handler.clone()), true)
        .await
        .unwrap();
    wait_until(Duration::from_secs(1), "first invocation", || {
        let handler = handler.clone();
        async move { handler.calls() == 1 }
    })
    .await;

    handle
        .register_job(Job::new("sync", every(60_000), handler.clone()), true)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(handler.calls(), 1);
    assert_eq!(handler.max_concurrent(), 1);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_remove_through_registry_trait() {
    let handler = Arc::new(CountingHandler::new());
    let (handle, _task) = Scheduler::new().start().unwrap();
    let registry: Arc<dyn JobRegistry> = Arc::new(handle.clone());

    registry
        .register_job(Job::new("poll", every(60_000), handler), false)
        .await
        .unwrap();
    registry.remove_job(&JobName::new("poll")).await.unwrap();
    registry.remove_job(&JobName::new("never-registered")).await.unwrap();

    assert!(handle.jobs().await.unwrap().is_empty());
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_waits_for_running_job() {
    let handler = StubbornHandler::new(Duration::from_millis(200));
    let (handle, task) = Scheduler::new()
        .with_shutdown_timeout(Duration::from_secs(5))
        .start()
        .unwrap();

    handle
        .register_job(Job::new("deploy", every(60_000), handler.clone()), true)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    handle.shutdown().await.unwrap();
    task.await.unwrap();

    assert!(handler.finished.load(Ordering::SeqCst));
    assert_eq!(handle.state().await, SchedulerState::Stopped);
}

#[tokio::test]
async fn test_shutdown_timeout_is_enforced() {
    let handler = StubbornHandler::new(Duration::from_secs(10));
    let (handle, _task) = Scheduler::new()
        .with_shutdown_timeout(Duration::from_millis(200))
        .start()
        .unwrap();

    handle
        .register_job(Job::new("stuck", every(60_000), handler.clone()), true)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = Instant::now();
    handle.shutdown().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!handler.finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_cron_schedule_registers_with_next_run() {
    let (handle, _task) = Scheduler::new().start().unwrap();
    let schedule = Schedule::with_timezone("0 0 */2 * * *", "America/New_York").unwrap();

    handle
        .register_job(
            Job::new("polling", schedule, Arc::new(CountingHandler::new())),
            false,
        )
        .await
        .unwrap();

    let jobs = handle.jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].timezone, "America/New_York");
    let next = jobs[0].next_run.unwrap();
    assert!(next > chrono::Utc::now());
    assert!(next <= chrono::Utc::now() + chrono::Duration::hours(2));
    handle.shutdown().await.unwrap();
}

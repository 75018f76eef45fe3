//! Testing utilities for users of the harbormaster library.
//!
//! This module provides in-memory doubles for the crate's capability traits:
//!
//! - [`FakeResourceProvider`]: A scriptable [`ResourceProvider`]
//! - [`RecordingRegistry`]: A [`JobRegistry`] that records registrations
//! - [`CountingHandler`]: A [`JobHandler`] that counts and times invocations
//! - [`RecordingHandler`]: An [`EventHandler`] that keeps every event
//! - [`FakeRepositorySync`]: A [`RepositorySync`] with a canned report

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core::job::{Job, JobContext, JobError, JobHandler};
use crate::core::types::{JobName, ResourceId};
use crate::events::{Event, EventHandler};
use crate::jobs::{RepositorySync, SyncReport};
use crate::scheduler::{JobRegistry, SchedulerError};
use crate::update::{ProviderError, Resource, ResourceProvider, ResourceType, UpdateCheck};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Tracks how many callers are inside a section at once.
#[derive(Debug, Default)]
struct ConcurrencyGauge {
    active: AtomicUsize,
    max: AtomicUsize,
}

impl ConcurrencyGauge {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// Scripted behavior of one fake resource.
#[derive(Debug, Clone)]
pub struct FakeResource {
    current_ref: String,
    latest_ref: String,
    check_error: Option<String>,
    apply_error: Option<String>,
}

impl FakeResource {
    /// A resource already on its latest reference.
    pub fn up_to_date(image_ref: impl Into<String>) -> Self {
        let image_ref = image_ref.into();
        Self {
            current_ref: image_ref.clone(),
            latest_ref: image_ref,
            check_error: None,
            apply_error: None,
        }
    }

    /// A resource with a newer reference available.
    pub fn outdated(current_ref: impl Into<String>, latest_ref: impl Into<String>) -> Self {
        Self {
            current_ref: current_ref.into(),
            latest_ref: latest_ref.into(),
            check_error: None,
            apply_error: None,
        }
    }

    /// Make update checks fail with the given message.
    pub fn failing_check(mut self, message: impl Into<String>) -> Self {
        self.check_error = Some(message.into());
        self
    }

    /// Make update application fail with the given message.
    pub fn failing_apply(mut self, message: impl Into<String>) -> Self {
        self.apply_error = Some(message.into());
        self
    }
}

#[derive(Debug, Default)]
struct FakeState {
    resources: BTreeMap<String, FakeResource>,
    enumerate_error: Option<String>,
    applied: Vec<(ResourceId, String)>,
}

/// An in-memory [`ResourceProvider`] for one resource type.
///
/// Resources are enumerated in ID order and named after their ID. Applying
/// an update moves the resource to the new reference.
#[derive(Debug)]
pub struct FakeResourceProvider {
    resource_type: ResourceType,
    delay: Duration,
    state: Mutex<FakeState>,
    gauge: ConcurrencyGauge,
}

impl FakeResourceProvider {
    /// Create an empty provider.
    pub fn new(resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            delay: Duration::ZERO,
            state: Mutex::new(FakeState::default()),
            gauge: ConcurrencyGauge::default(),
        }
    }

    /// Make every update check take `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Add or replace a resource.
    pub fn add(&self, id: &str, resource: FakeResource) {
        lock(&self.state).resources.insert(id.to_string(), resource);
    }

    /// Make enumeration fail with the given message.
    pub fn fail_enumeration(&self, message: impl Into<String>) {
        lock(&self.state).enumerate_error = Some(message.into());
    }

    /// Current reference of a resource.
    pub fn current_ref(&self, id: &str) -> Option<String> {
        lock(&self.state)
            .resources
            .get(id)
            .map(|r| r.current_ref.clone())
    }

    /// Updates applied so far, in order.
    pub fn applied(&self) -> Vec<(ResourceId, String)> {
        lock(&self.state).applied.clone()
    }

    /// Number of updates applied.
    pub fn apply_count(&self) -> usize {
        lock(&self.state).applied.len()
    }

    /// Highest number of concurrent update checks observed.
    pub fn max_concurrent(&self) -> usize {
        self.gauge.max()
    }

    fn lookup(&self, id: &ResourceId) -> Result<FakeResource, ProviderError> {
        lock(&self.state)
            .resources
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| ProviderError::Gone(id.to_string()))
    }
}

#[async_trait]
impl ResourceProvider for FakeResourceProvider {
    fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    async fn enumerate(&self) -> Result<Vec<Resource>, ProviderError> {
        let state = lock(&self.state);
        if let Some(message) = &state.enumerate_error {
            return Err(ProviderError::Backend(message.clone()));
        }
        Ok(state
            .resources
            .iter()
            .map(|(id, r)| Resource::new(id.as_str(), self.resource_type, id.as_str(), r.current_ref.as_str()))
            .collect())
    }

    async fn check_for_update(&self, resource: &Resource) -> Result<UpdateCheck, ProviderError> {
        self.gauge.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.gauge.exit();

        let fake = self.lookup(&resource.id)?;
        if let Some(message) = fake.check_error {
            return Err(ProviderError::Backend(message));
        }
        if fake.current_ref == fake.latest_ref {
            Ok(UpdateCheck::up_to_date(fake.current_ref))
        } else {
            Ok(UpdateCheck::available(fake.latest_ref))
        }
    }

    async fn apply_update(&self, resource: &Resource, new_ref: &str) -> Result<(), ProviderError> {
        let fake = self.lookup(&resource.id)?;
        if let Some(reason) = fake.apply_error {
            return Err(ProviderError::Pull {
                image: new_ref.to_string(),
                reason,
            });
        }

        let mut state = lock(&self.state);
        if let Some(entry) = state.resources.get_mut(resource.id.as_str()) {
            entry.current_ref = new_ref.to_string();
        }
        state.applied.push((resource.id.clone(), new_ref.to_string()));
        Ok(())
    }
}

/// A [`JobRegistry`] that records every call instead of scheduling.
#[derive(Debug, Default)]
pub struct RecordingRegistry {
    registered: Mutex<Vec<(Job, bool)>>,
    removed: Mutex<Vec<JobName>>,
}

impl RecordingRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of registered jobs, in registration order.
    pub fn registered_names(&self) -> Vec<String> {
        lock(&self.registered)
            .iter()
            .map(|(job, _)| job.name().to_string())
            .collect()
    }

    /// Most recent registration under `name` and its `run_immediately` flag.
    pub fn last_registration(&self, name: &str) -> Option<(Job, bool)> {
        lock(&self.registered)
            .iter()
            .rev()
            .find(|(job, _)| job.name().as_str() == name)
            .cloned()
    }

    /// Names passed to `remove_job`, in order.
    pub fn removed_names(&self) -> Vec<String> {
        lock(&self.removed).iter().map(|n| n.to_string()).collect()
    }
}

#[async_trait]
impl JobRegistry for RecordingRegistry {
    async fn register_job(&self, job: Job, run_immediately: bool) -> Result<(), SchedulerError> {
        lock(&self.registered).push((job, run_immediately));
        Ok(())
    }

    async fn remove_job(&self, name: &JobName) -> Result<(), SchedulerError> {
        lock(&self.removed).push(name.clone());
        Ok(())
    }
}

/// A [`JobHandler`] that counts invocations.
///
/// Optionally sleeps for a fixed time (returning early on cancellation)
/// and fails every invocation.
#[derive(Debug, Default)]
pub struct CountingHandler {
    delay: Duration,
    fail: bool,
    calls: AtomicUsize,
    cancellations: AtomicUsize,
    gauge: ConcurrencyGauge,
}

impl CountingHandler {
    /// Create a handler that succeeds immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every invocation take `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make every invocation fail.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Number of invocations started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of invocations that stopped because of cancellation.
    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping invocations observed.
    pub fn max_concurrent(&self) -> usize {
        self.gauge.max()
    }
}

#[async_trait]
impl JobHandler for CountingHandler {
    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gauge.enter();

        let canceled = if self.delay.is_zero() {
            false
        } else {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => false,
                _ = ctx.cancel.cancelled() => true,
            }
        };
        self.gauge.exit();

        if canceled {
            self.cancellations.fetch_add(1, Ordering::SeqCst);
            return Err(JobError::Canceled);
        }
        if self.fail {
            return Err(JobError::Failed("induced failure".to_string()));
        }
        Ok(())
    }
}

/// An [`EventHandler`] that records every event.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    events: tokio::sync::Mutex<Vec<Event>>,
}

impl RecordingHandler {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far.
    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    /// Number of events matching `predicate`.
    pub async fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().await.iter().filter(|e| predicate(e)).count()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}

/// A [`RepositorySync`] returning a fixed report.
#[derive(Debug, Default)]
pub struct FakeRepositorySync {
    report: SyncReport,
    error: Option<String>,
    calls: AtomicUsize,
}

impl FakeRepositorySync {
    /// Create a sync that reports `synced` successful repositories.
    pub fn new(synced: usize) -> Self {
        Self {
            report: SyncReport { synced, failed: 0 },
            ..Self::default()
        }
    }

    /// Report `failed` repositories that could not be synced.
    pub fn with_failures(mut self, failed: usize) -> Self {
        self.report.failed = failed;
        self
    }

    /// Make every sync fail outright.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    /// Number of sync passes run.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositorySync for FakeRepositorySync {
    async fn sync_all(&self, _cancel: &CancellationToken) -> Result<SyncReport, JobError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.error {
            Some(message) => Err(JobError::Failed(message.clone())),
            None => Ok(self.report),
        }
    }
}

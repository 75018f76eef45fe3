//! Concurrent check/update runs across resources.
//!
//! A run selects its targets, admits each one into the in-flight registry,
//! and feeds the admitted resources to a fixed pool of workers through a
//! FIFO queue. Every resource ends in exactly one [`ResourceResult`]; one
//! resource failing never stops the others.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::core::types::{ResourceId, RunId};
use crate::events::{Event, EventBus};

use super::provider::{ProviderError, ResourceProvider};
use super::registry::{InFlightGuard, InFlightRegistry};
use super::types::{
    Resource, ResourceResult, ResourceStatus, ResourceType, UpdateRequest, UpdateResult,
    UpdaterStatus,
};

/// Default number of concurrent workers per run.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Skip reason for resources owned by another run.
pub const REASON_IN_PROGRESS: &str = "already in progress";

/// Skip reason for resources not yet started when the run was canceled.
pub const REASON_CANCELED: &str = "run canceled";

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The requested resource type has no provider.
    #[error("no provider registered for {0} resources")]
    NoProvider(ResourceType),

    /// Listing the targets failed; no meaningful partial result exists.
    #[error("failed to enumerate {resource_type} resources: {source}")]
    Enumeration {
        resource_type: ResourceType,
        #[source]
        source: ProviderError,
    },
}

/// Options applied to every resource in a run.
#[derive(Debug, Clone, Copy)]
struct RunOptions {
    force: bool,
    dry_run: bool,
}

type WorkItem = (Resource, InFlightGuard);

/// Coordinates update checks and applications across resources.
pub struct UpdateOrchestrator {
    providers: HashMap<ResourceType, Arc<dyn ResourceProvider>>,
    registry: InFlightRegistry,
    max_workers: usize,
    run_timeout: Option<Duration>,
    event_bus: Option<Arc<EventBus>>,
}

impl UpdateOrchestrator {
    /// Create an orchestrator with no providers.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            registry: InFlightRegistry::new(),
            max_workers: DEFAULT_MAX_WORKERS,
            run_timeout: None,
            event_bus: None,
        }
    }

    /// Register the provider for its resource type, replacing any previous one.
    pub fn with_provider(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        self.providers.insert(provider.resource_type(), provider);
        self
    }

    /// Set the worker pool size (at least 1).
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Cancel runs that take longer than `timeout`.
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    /// Report run progress on the given event bus.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Get the worker pool size.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Resource types with a registered provider.
    pub fn resource_types(&self) -> Vec<ResourceType> {
        ResourceType::ALL
            .into_iter()
            .filter(|t| self.providers.contains_key(t))
            .collect()
    }

    /// Snapshot of resources currently in flight.
    pub fn status(&self) -> UpdaterStatus {
        self.registry.snapshot()
    }

    /// Check and, unless dry-running, apply updates for the requested resources.
    ///
    /// Cancelling `cancel` lets in-progress resources finish and marks the
    /// rest as skipped; the partial result is still returned. Only target
    /// enumeration failures are reported as errors.
    pub async fn check_and_update(
        &self,
        cancel: &CancellationToken,
        request: UpdateRequest,
    ) -> Result<UpdateResult, UpdateError> {
        let run_id = RunId::new();
        let span = info_span!(
            "update_run",
            run = %run_id,
            dry_run = request.dry_run,
            force = request.force_update,
        );
        self.run(run_id, cancel, request).instrument(span).await
    }

    async fn run(
        &self,
        run_id: RunId,
        cancel: &CancellationToken,
        request: UpdateRequest,
    ) -> Result<UpdateResult, UpdateError> {
        let started_at = Utc::now();
        let options = RunOptions {
            force: request.force_update,
            dry_run: request.dry_run,
        };

        let (targets, mut items) = self.select_targets(&request).await?;
        self.emit(Event::update_run_started(
            run_id.clone(),
            targets.len() + items.len(),
            options.dry_run,
        ))
        .await;

        let run_token = cancel.child_token();
        let _stop_timer = run_token.clone().drop_guard();
        if let Some(timeout) = self.run_timeout {
            spawn_run_timeout(run_token.clone(), timeout);
        }

        let mut admitted = Vec::with_capacity(targets.len());
        for resource in targets {
            match self.registry.try_acquire(&resource.id, resource.resource_type) {
                Some(guard) => admitted.push((resource, guard)),
                None => {
                    debug!(resource_id = %resource.id, "Resource already in progress, skipping");
                    items.push(ResourceResult::skipped(&resource, REASON_IN_PROGRESS));
                }
            }
        }

        let expected: Vec<Resource> = admitted.iter().map(|(r, _)| r.clone()).collect();
        let mut completed = HashSet::new();

        let (result_tx, mut result_rx) = mpsc::unbounded_channel();
        let mut workers = self.spawn_workers(admitted, options, &run_token, result_tx);

        while let Some(result) = result_rx.recv().await {
            if let Some(resource_type) = result.resource_type {
                self.emit(Event::resource_processed(
                    run_id.clone(),
                    result.resource_id.clone(),
                    resource_type,
                    result.status,
                ))
                .await;
            }
            completed.insert(result.resource_id.clone());
            items.push(result);
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Update worker terminated abnormally");
            }
        }

        for resource in expected.iter().filter(|r| !completed.contains(&r.id)) {
            items.push(
                ResourceResult::for_resource(resource, ResourceStatus::Checked)
                    .failed("update worker terminated unexpectedly"),
            );
        }

        let result = UpdateResult::from_items(started_at, items);
        info!(
            checked = result.checked,
            updated = result.updated,
            skipped = result.skipped,
            failed = result.failed,
            duration_ms = result.duration_ms,
            canceled = run_token.is_cancelled(),
            "Update run completed"
        );
        self.emit(Event::UpdateRunCompleted {
            run_id,
            checked: result.checked,
            updated: result.updated,
            skipped: result.skipped,
            failed: result.failed,
            duration: result.duration(),
            timestamp: std::time::Instant::now(),
        })
        .await;

        Ok(result)
    }

    /// Resolve the request into resources to process, plus failed items for
    /// requested IDs that no provider reported.
    ///
    /// Providers are enumerated in [`ResourceType::ALL`] order. With explicit
    /// IDs, enumeration stops once every requested ID has been seen, so a
    /// provider that fails later in that order does not abort the run.
    async fn select_targets(
        &self,
        request: &UpdateRequest,
    ) -> Result<(Vec<Resource>, Vec<ResourceResult>), UpdateError> {
        let types = match request.resource_type {
            Some(t) if !self.providers.contains_key(&t) => return Err(UpdateError::NoProvider(t)),
            Some(t) => vec![t],
            None => self.resource_types(),
        };

        let wanted: HashSet<&ResourceId> = request.resource_ids.iter().collect();
        let mut found: HashSet<&ResourceId> = HashSet::new();
        let mut resources = Vec::new();
        for resource_type in types {
            if !wanted.is_empty() && found.len() == wanted.len() {
                debug!(%resource_type, "All requested resources found, skipping enumeration");
                break;
            }
            let Some(provider) = self.providers.get(&resource_type) else {
                continue;
            };
            let listed = provider
                .enumerate()
                .await
                .map_err(|source| UpdateError::Enumeration {
                    resource_type,
                    source,
                })?;
            debug!(%resource_type, count = listed.len(), "Enumerated resources");
            found.extend(listed.iter().filter_map(|r| wanted.get(&r.id).copied()));
            resources.extend(listed);
        }

        if request.resource_ids.is_empty() {
            return Ok((resources, Vec::new()));
        }

        let mut by_id: HashMap<_, _> = resources.into_iter().map(|r| (r.id.clone(), r)).collect();
        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        let mut missing = Vec::new();
        for id in &request.resource_ids {
            if !seen.insert(id) {
                continue;
            }
            match by_id.remove(id) {
                Some(resource) => targets.push(resource),
                None => {
                    warn!(resource_id = %id, "Requested resource not found");
                    missing.push(ResourceResult::not_found(id.clone(), request.resource_type));
                }
            }
        }
        Ok((targets, missing))
    }

    /// Start up to `max_workers` workers draining a FIFO queue of admitted resources.
    fn spawn_workers(
        &self,
        admitted: Vec<WorkItem>,
        options: RunOptions,
        run_token: &CancellationToken,
        result_tx: mpsc::UnboundedSender<ResourceResult>,
    ) -> JoinSet<()> {
        let worker_count = self.max_workers.min(admitted.len());
        let (queue_tx, queue_rx) = mpsc::unbounded_channel::<WorkItem>();
        for work in admitted {
            // The receiver is alive in this scope, so sending cannot fail.
            let _ = queue_tx.send(work);
        }
        drop(queue_tx);

        let queue = Arc::new(Mutex::new(queue_rx));
        let mut workers = JoinSet::new();
        for worker in 0..worker_count {
            let queue = Arc::clone(&queue);
            let providers = self.providers.clone();
            let token = run_token.clone();
            let result_tx = result_tx.clone();
            workers.spawn(
                async move {
                    loop {
                        let next = queue.lock().await.recv().await;
                        let Some((resource, guard)) = next else {
                            break;
                        };

                        let result = if token.is_cancelled() {
                            ResourceResult::skipped(&resource, REASON_CANCELED)
                        } else {
                            match providers.get(&resource.resource_type) {
                                Some(provider) => {
                                    process(provider.as_ref(), &resource, options)
                                        .instrument(info_span!("resource", id = %resource.id))
                                        .await
                                }
                                None => ResourceResult::for_resource(&resource, ResourceStatus::Checked)
                                    .failed(format!(
                                        "no provider registered for {} resources",
                                        resource.resource_type
                                    )),
                            }
                        };
                        drop(guard);

                        if result_tx.send(result).is_err() {
                            break;
                        }
                    }
                }
                .instrument(info_span!("update_worker", worker)),
            );
        }
        workers
    }

    async fn emit(&self, event: Event) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event).await;
        }
    }
}

impl Default for UpdateOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_run_timeout(token: CancellationToken, timeout: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                warn!(?timeout, "Update run timed out, canceling remaining resources");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    });
}

/// Check one resource and apply its update when appropriate.
async fn process(
    provider: &dyn ResourceProvider,
    resource: &Resource,
    options: RunOptions,
) -> ResourceResult {
    let result = ResourceResult::for_resource(resource, ResourceStatus::Checked);

    let check = match provider.check_for_update(resource).await {
        Ok(check) => check,
        Err(e) => {
            warn!(resource_id = %resource.id, error = %e, "Update check failed");
            return result.failed(e.to_string());
        }
    };

    let mut result = result;
    result.update_available = check.available;
    result
        .details
        .insert("latestRef".to_string(), check.latest_ref.clone().into());

    if !check.available && !options.force {
        return result.with_status(ResourceStatus::UpToDate);
    }

    if options.dry_run {
        let status = if check.available {
            ResourceStatus::UpdateAvailable
        } else {
            ResourceStatus::UpToDate
        };
        return result.with_status(status);
    }

    let new_ref = if check.latest_ref.is_empty() {
        resource.image_ref.clone()
    } else {
        check.latest_ref
    };

    debug!(resource_id = %resource.id, from = %resource.image_ref, to = %new_ref, "Applying update");
    match provider.apply_update(resource, &new_ref).await {
        Ok(()) => {
            info!(resource_id = %resource.id, image = %new_ref, "Resource updated");
            result.update_applied = true;
            result
                .old_images
                .insert(resource.name.clone(), resource.image_ref.clone());
            result.new_images.insert(resource.name.clone(), new_ref);
            result.with_status(ResourceStatus::Updated)
        }
        Err(e) => {
            warn!(resource_id = %resource.id, error = %e, "Update failed");
            result.failed(e.to_string())
        }
    }
}

//! Update orchestrator integration tests.
//!
//! Tests that exercise full runs through the public API: aggregation,
//! overlapping runs on a shared orchestrator, cancellation and events.

use harbormaster::testing::{FakeResource, RecordingHandler};
use harbormaster::update::{REASON_CANCELED, REASON_IN_PROGRESS};
use harbormaster::{
    Event, EventBus, ResourceStatus, ResourceType, UpdateOrchestrator, UpdateRequest,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::common::{provider, slow_provider, wait_until};

#[tokio::test]
async fn test_three_containers_one_failing_update() {
    let containers = provider(
        ResourceType::Container,
        &[
            ("web", FakeResource::up_to_date("nginx:1.25")),
            ("cache", FakeResource::up_to_date("redis:7.2")),
            (
                "api",
                FakeResource::outdated("api:1.0", "api:1.1").failing_apply("manifest unknown"),
            ),
        ],
    );
    let orchestrator = UpdateOrchestrator::new().with_provider(containers);

    let result = orchestrator
        .check_and_update(&CancellationToken::new(), UpdateRequest::all())
        .await
        .unwrap();

    assert_eq!(
        (result.checked, result.updated, result.skipped, result.failed),
        (3, 0, 0, 1)
    );
    assert_eq!(result.checked, result.items.len());
    let failed = result.item(&"api".into()).unwrap();
    assert_eq!(failed.status, ResourceStatus::Failed);
    assert!(failed.error.as_deref().unwrap().contains("manifest unknown"));
    assert!(orchestrator.status().is_idle());
}

#[tokio::test]
async fn test_overlapping_runs_skip_in_flight_resources() {
    let containers = slow_provider(
        ResourceType::Container,
        Duration::from_millis(200),
        &[
            ("a", FakeResource::outdated("a:1", "a:2")),
            ("b", FakeResource::outdated("b:1", "b:2")),
            ("c", FakeResource::outdated("c:1", "c:2")),
        ],
    );
    let orchestrator = Arc::new(UpdateOrchestrator::new().with_provider(containers.clone()));

    let first = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .check_and_update(&CancellationToken::new(), UpdateRequest::all())
                .await
        })
    };

    wait_until(Duration::from_secs(2), "first run to admit resources", || {
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.status().updating_containers == 3 }
    })
    .await;

    let status = orchestrator.status();
    assert_eq!(status.container_ids.len(), 3);
    assert_eq!(status.updating_projects, 0);

    let second = orchestrator
        .check_and_update(&CancellationToken::new(), UpdateRequest::all())
        .await
        .unwrap();
    let first = first.await.unwrap().unwrap();

    assert_eq!(second.skipped, 3);
    assert!(second.items.iter().all(|i| i.reason() == Some(REASON_IN_PROGRESS)));
    assert_eq!(first.updated, 3);
    assert_eq!(containers.apply_count(), 3);
    assert!(orchestrator.status().is_idle());
}

#[tokio::test]
async fn test_cancellation_returns_partial_result() {
    let ids: Vec<String> = (0..6).map(|i| format!("c{}", i)).collect();
    let fakes: Vec<(&str, FakeResource)> = ids
        .iter()
        .map(|id| (id.as_str(), FakeResource::outdated("app:1", "app:2")))
        .collect();
    let containers = slow_provider(ResourceType::Container, Duration::from_millis(80), &fakes);
    let orchestrator = UpdateOrchestrator::new()
        .with_provider(containers.clone())
        .with_max_workers(1);

    let cancel = CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            cancel.cancel();
        })
    };

    let result = orchestrator
        .check_and_update(&cancel, UpdateRequest::all())
        .await
        .unwrap();
    canceller.await.unwrap();

    assert_eq!(result.checked, 6);
    assert!(result.updated >= 1);
    assert!(result.skipped >= 1);
    assert_eq!(result.updated + result.skipped, 6);
    for item in result.items_with_status(ResourceStatus::Skipped) {
        assert_eq!(item.reason(), Some(REASON_CANCELED));
    }
    assert_eq!(containers.apply_count(), result.updated);
    assert!(orchestrator.status().is_idle());
}

#[tokio::test]
async fn test_type_filter_and_all_types() {
    let containers = provider(
        ResourceType::Container,
        &[("web", FakeResource::outdated("nginx:1.24", "nginx:1.25"))],
    );
    let projects = provider(
        ResourceType::Project,
        &[
            ("blog", FakeResource::up_to_date("ghost:5")),
            ("wiki", FakeResource::outdated("wiki:1", "wiki:2")),
        ],
    );
    let orchestrator = UpdateOrchestrator::new()
        .with_provider(containers.clone())
        .with_provider(projects.clone());

    let only_projects = orchestrator
        .check_and_update(
            &CancellationToken::new(),
            UpdateRequest::for_type(ResourceType::Project).dry_run(),
        )
        .await
        .unwrap();
    assert_eq!(only_projects.checked, 2);
    assert!(
        only_projects
            .items
            .iter()
            .all(|i| i.resource_type == Some(ResourceType::Project))
    );

    let everything = orchestrator
        .check_and_update(&CancellationToken::new(), UpdateRequest::all())
        .await
        .unwrap();
    assert_eq!(everything.checked, 3);
    assert_eq!(everything.updated, 2);
    assert_eq!(containers.apply_count(), 1);
    assert_eq!(projects.apply_count(), 1);
}

#[tokio::test]
async fn test_run_reports_events() {
    let recorder = Arc::new(RecordingHandler::new());
    let bus = Arc::new(EventBus::new());
    bus.register(recorder.clone()).await;

    let containers = provider(
        ResourceType::Container,
        &[
            ("a", FakeResource::outdated("a:1", "a:2")),
            ("b", FakeResource::up_to_date("b:1")),
        ],
    );
    let orchestrator = UpdateOrchestrator::new()
        .with_provider(containers)
        .with_event_bus(bus);

    orchestrator
        .check_and_update(&CancellationToken::new(), UpdateRequest::all())
        .await
        .unwrap();

    let events = recorder.events().await;
    assert!(matches!(
        events.first(),
        Some(Event::UpdateRunStarted {
            targets: 2,
            dry_run: false,
            ..
        })
    ));
    assert!(matches!(
        events.last(),
        Some(Event::UpdateRunCompleted {
            checked: 2,
            updated: 1,
            ..
        })
    ));
    let processed = recorder
        .count(|e| matches!(e, Event::ResourceProcessed { .. }))
        .await;
    assert_eq!(processed, 2);
}

#[tokio::test]
async fn test_result_serializes_for_api() {
    let containers = provider(
        ResourceType::Container,
        &[("web", FakeResource::outdated("nginx:1.24", "nginx:1.25"))],
    );
    let orchestrator = UpdateOrchestrator::new().with_provider(containers);

    let result = orchestrator
        .check_and_update(&CancellationToken::new(), UpdateRequest::all())
        .await
        .unwrap();
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["checked"], 1);
    assert_eq!(json["updated"], 1);
    assert_eq!(json["items"][0]["status"], "updated");
    assert_eq!(json["items"][0]["updateApplied"], true);
    assert_eq!(json["items"][0]["newImages"]["web"], "nginx:1.25");
    assert!(json.get("durationMs").is_some());
}

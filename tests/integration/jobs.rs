//! Built-in job integration tests.
//!
//! Tests that wire settings, the scheduler, the orchestrator and the
//! repository sync together the way the dashboard does at startup.

use harbormaster::jobs::{AUTO_UPDATE, GITOPS_SYNC, IMAGE_POLLING};
use harbormaster::settings::keys;
use harbormaster::testing::{FakeRepositorySync, FakeResource};
use harbormaster::{
    InMemorySettings, JobServices, ResourceType, Scheduler, SettingsProvider, UpdateOrchestrator,
    YamlLoader, schedule_builtin_jobs,
};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{provider, wait_until};

struct Fixture {
    settings: Arc<InMemorySettings>,
    sync: Arc<FakeRepositorySync>,
    containers: Arc<harbormaster::testing::FakeResourceProvider>,
    services: JobServices,
}

fn fixture(settings: InMemorySettings) -> Fixture {
    let settings = Arc::new(settings);
    let sync = Arc::new(FakeRepositorySync::new(3));
    let containers = provider(
        ResourceType::Container,
        &[("web", FakeResource::outdated("nginx:1.24", "nginx:1.25"))],
    );
    let images = provider(
        ResourceType::Image,
        &[("nginx", FakeResource::outdated("nginx:1.24", "nginx:1.25"))],
    );
    let orchestrator = Arc::new(
        UpdateOrchestrator::new()
            .with_provider(containers.clone())
            .with_provider(images),
    );

    let services = JobServices {
        settings: settings.clone(),
        orchestrator,
        repository_sync: sync.clone(),
        timezone: "UTC".to_string(),
    };
    Fixture {
        settings,
        sync,
        containers,
        services,
    }
}

#[tokio::test]
async fn test_default_settings_schedule_sync_and_polling() {
    let fx = fixture(InMemorySettings::new());
    let (handle, _task) = Scheduler::new().start().unwrap();

    let outcome = schedule_builtin_jobs(&handle, &fx.services, false)
        .await
        .unwrap();

    let enabled: Vec<(&str, bool)> = outcome.iter().map(|(n, e)| (n.as_str(), *e)).collect();
    assert_eq!(
        enabled,
        vec![
            (GITOPS_SYNC.name, true),
            (AUTO_UPDATE.name, false),
            (IMAGE_POLLING.name, true)
        ]
    );

    let jobs = handle.jobs().await.unwrap();
    let names: Vec<&str> = jobs.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["gitops-sync", "image-polling"]);
    assert_eq!(jobs[0].schedule, GITOPS_SYNC.default_schedule);
    assert_eq!(jobs[1].schedule, IMAGE_POLLING.default_schedule);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_gitops_interval_falls_back_to_every_minute() {
    let fx = fixture(InMemorySettings::new().with(keys::GITOPS_SYNC_INTERVAL, "not-a-cron"));
    let (handle, _task) = Scheduler::new().start().unwrap();

    schedule_builtin_jobs(&handle, &fx.services, false)
        .await
        .unwrap();

    let jobs = handle.jobs().await.unwrap();
    let gitops = jobs.iter().find(|j| j.name.as_str() == "gitops-sync").unwrap();
    assert_eq!(gitops.schedule, "0 */1 * * * *");
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rescheduling_after_settings_change() {
    let fx = fixture(InMemorySettings::new());
    let (handle, _task) = Scheduler::new().start().unwrap();

    schedule_builtin_jobs(&handle, &fx.services, false)
        .await
        .unwrap();

    fx.settings.set_string(keys::AUTO_UPDATE, "true");
    fx.settings.set_string(keys::AUTO_UPDATE_INTERVAL, "360");
    fx.settings.set_string(keys::POLLING_ENABLED, "false");
    schedule_builtin_jobs(&handle, &fx.services, false)
        .await
        .unwrap();

    let jobs = handle.jobs().await.unwrap();
    let names: Vec<&str> = jobs.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["auto-update", "gitops-sync"]);
    assert_eq!(jobs[0].schedule, "0 0 */6 * * *");
    assert_eq!(
        fx.settings.get(keys::AUTO_UPDATE_INTERVAL).as_deref(),
        Some("0 0 */6 * * *")
    );
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_run_immediately_syncs_and_updates() {
    let fx = fixture(InMemorySettings::new().with(keys::AUTO_UPDATE, "true"));
    let (handle, _task) = Scheduler::new().start().unwrap();

    schedule_builtin_jobs(&handle, &fx.services, true)
        .await
        .unwrap();

    let sync = fx.sync.clone();
    wait_until(Duration::from_secs(2), "gitops sync", || {
        let sync = sync.clone();
        async move { sync.calls() >= 1 }
    })
    .await;
    let containers = fx.containers.clone();
    wait_until(Duration::from_secs(2), "auto-update", || {
        let containers = containers.clone();
        async move { containers.apply_count() == 1 }
    })
    .await;

    assert_eq!(fx.containers.current_ref("web").as_deref(), Some("nginx:1.25"));
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_job_disabled_between_ticks_does_nothing() {
    let fx = fixture(InMemorySettings::new());
    let (handle, _task) = Scheduler::new().start().unwrap();

    schedule_builtin_jobs(&handle, &fx.services, false)
        .await
        .unwrap();
    fx.settings.set_string(keys::GITOPS_SYNC_ENABLED, "false");

    handle.trigger(GITOPS_SYNC.name).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(fx.sync.calls(), 0);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_settings_seeded_from_config_file() {
    let config = YamlLoader::parse_str(
        r#"
timezone: Europe/Paris
settings:
  gitopsSyncInterval: 5
  pollingEnabled: false
"#,
    )
    .unwrap();
    let mut fx = fixture(config.settings_provider().unwrap());
    fx.services.timezone = config.timezone.clone();
    let (handle, _task) = config.scheduler().start().unwrap();

    schedule_builtin_jobs(&handle, &fx.services, false)
        .await
        .unwrap();

    let jobs = handle.jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].schedule, "0 */5 * * * *");
    assert_eq!(jobs[0].timezone, "Europe/Paris");
    handle.shutdown().await.unwrap();
}

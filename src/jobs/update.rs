//! Jobs driving the update orchestrator.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::job::{JobContext, JobError, JobHandler};
use crate::settings::SettingsProvider;
use crate::update::{ResourceStatus, ResourceType, UpdateOrchestrator, UpdateRequest};

use super::{AUTO_UPDATE, IMAGE_POLLING};

/// Applies available updates to every resource on each tick while enabled.
pub struct AutoUpdateJob {
    settings: Arc<dyn SettingsProvider>,
    orchestrator: Arc<UpdateOrchestrator>,
}

impl AutoUpdateJob {
    /// Create the job handler.
    pub fn new(settings: Arc<dyn SettingsProvider>, orchestrator: Arc<UpdateOrchestrator>) -> Self {
        Self {
            settings,
            orchestrator,
        }
    }
}

#[async_trait]
impl JobHandler for AutoUpdateJob {
    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        if !AUTO_UPDATE.is_enabled(self.settings.as_ref()) {
            debug!("Auto-update disabled, skipping");
            return Ok(());
        }

        let result = self
            .orchestrator
            .check_and_update(&ctx.cancel, UpdateRequest::default())
            .await
            .map_err(|e| JobError::Other(Box::new(e)))?;

        if result.failed > 0 {
            warn!(
                checked = result.checked,
                updated = result.updated,
                failed = result.failed,
                "Auto-update finished with failures"
            );
        } else {
            info!(
                checked = result.checked,
                updated = result.updated,
                skipped = result.skipped,
                "Auto-update completed"
            );
        }
        Ok(())
    }
}

/// Checks images for newer references without applying them.
pub struct ImagePollingJob {
    settings: Arc<dyn SettingsProvider>,
    orchestrator: Arc<UpdateOrchestrator>,
}

impl ImagePollingJob {
    /// Create the job handler.
    pub fn new(settings: Arc<dyn SettingsProvider>, orchestrator: Arc<UpdateOrchestrator>) -> Self {
        Self {
            settings,
            orchestrator,
        }
    }
}

#[async_trait]
impl JobHandler for ImagePollingJob {
    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        if !IMAGE_POLLING.is_enabled(self.settings.as_ref()) {
            debug!("Image polling disabled, skipping");
            return Ok(());
        }
        if !self
            .orchestrator
            .resource_types()
            .contains(&ResourceType::Image)
        {
            debug!("No image provider registered, skipping image polling");
            return Ok(());
        }

        let request = UpdateRequest::for_type(ResourceType::Image).dry_run();
        let result = self
            .orchestrator
            .check_and_update(&ctx.cancel, request)
            .await
            .map_err(|e| JobError::Other(Box::new(e)))?;

        let available = result
            .items_with_status(ResourceStatus::UpdateAvailable)
            .count();
        info!(
            checked = result.checked,
            available,
            failed = result.failed,
            "Image polling completed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::Trigger;
    use crate::core::types::JobName;
    use crate::settings::{InMemorySettings, keys};
    use crate::testing::{FakeResource, FakeResourceProvider};
    use tokio_util::sync::CancellationToken;

    fn ctx(name: &str) -> JobContext {
        JobContext::new(JobName::new(name), Trigger::Scheduled, CancellationToken::new())
    }

    fn orchestrator_with(
        provider: &Arc<FakeResourceProvider>,
    ) -> Arc<UpdateOrchestrator> {
        Arc::new(UpdateOrchestrator::new().with_provider(provider.clone()))
    }

    #[tokio::test]
    async fn test_auto_update_is_opt_in() {
        let provider = Arc::new(FakeResourceProvider::new(ResourceType::Container));
        provider.add("c1", FakeResource::outdated("a:1", "a:2"));
        let settings = Arc::new(InMemorySettings::new());
        let job = AutoUpdateJob::new(settings.clone(), orchestrator_with(&provider));

        job.run(ctx("auto-update")).await.unwrap();
        assert_eq!(provider.apply_count(), 0);

        settings.set_string(keys::AUTO_UPDATE, "true");
        job.run(ctx("auto-update")).await.unwrap();
        assert_eq!(provider.apply_count(), 1);
    }

    #[tokio::test]
    async fn test_polling_never_applies() {
        let provider = Arc::new(FakeResourceProvider::new(ResourceType::Image));
        provider.add("nginx", FakeResource::outdated("nginx:1.24", "nginx:1.25"));
        let job = ImagePollingJob::new(
            Arc::new(InMemorySettings::new()),
            orchestrator_with(&provider),
        );

        job.run(ctx("image-polling")).await.unwrap();

        assert_eq!(provider.apply_count(), 0);
        assert_eq!(provider.current_ref("nginx").as_deref(), Some("nginx:1.24"));
    }

    #[tokio::test]
    async fn test_polling_without_image_provider_is_a_no_op() {
        let provider = Arc::new(FakeResourceProvider::new(ResourceType::Container));
        provider.add("web", FakeResource::outdated("nginx:1.24", "nginx:1.25"));
        let job = ImagePollingJob::new(
            Arc::new(InMemorySettings::new()),
            orchestrator_with(&provider),
        );

        job.run(ctx("image-polling")).await.unwrap();

        assert_eq!(provider.apply_count(), 0);
        assert_eq!(provider.current_ref("web").as_deref(), Some("nginx:1.24"));
    }
}

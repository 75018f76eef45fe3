//! GitOps repository sync job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::job::{JobContext, JobError, JobHandler};
use crate::settings::SettingsProvider;

use super::GITOPS_SYNC;

/// Outcome of one sync pass over all configured repositories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
}

/// Pulls every configured GitOps repository and redeploys what changed.
#[async_trait]
pub trait RepositorySync: Send + Sync {
    /// Sync every repository. A single failing repository is counted in
    /// the report; `Err` means the pass could not run at all.
    async fn sync_all(&self, cancel: &CancellationToken) -> Result<SyncReport, JobError>;
}

/// Runs [`RepositorySync::sync_all`] on each tick while enabled.
pub struct GitOpsSyncJob {
    settings: Arc<dyn SettingsProvider>,
    sync: Arc<dyn RepositorySync>,
}

impl GitOpsSyncJob {
    /// Create the job handler.
    pub fn new(settings: Arc<dyn SettingsProvider>, sync: Arc<dyn RepositorySync>) -> Self {
        Self { settings, sync }
    }
}

#[async_trait]
impl JobHandler for GitOpsSyncJob {
    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        if !GITOPS_SYNC.is_enabled(self.settings.as_ref()) {
            debug!("GitOps sync disabled, skipping");
            return Ok(());
        }

        let report = self.sync.sync_all(&ctx.cancel).await?;
        if report.failed > 0 {
            warn!(
                synced = report.synced,
                failed = report.failed,
                "GitOps sync finished with failures"
            );
        } else {
            info!(synced = report.synced, "GitOps sync completed");
        }
        Ok(())
    }
}

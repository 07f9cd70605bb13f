use std::time::Duration;

use async_trait::async_trait;
use kiln_core::{Engine, WaitOptions};
use kiln_model::{
    BuildTask, BuildTaskId, BuildTaskPage, BuildTaskQuery, JobRunManifest, JobSubmission,
    PackageId, WorkspaceId,
};

use crate::{
    error::ApiError,
    handler::{ApiHandler, BuildTaskView},
};

/// [`ApiHandler`] backed by a kiln [`Engine`].
pub struct EngineAdapter {
    engine: Engine,
    wait_timeout: Duration,
}

impl EngineAdapter {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            wait_timeout: WaitOptions::default().timeout,
        }
    }

    /// Bound on how long a submission waits for its package build.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }
}

#[async_trait]
impl ApiHandler for EngineAdapter {
    async fn submit_job(&self, submission: JobSubmission) -> Result<JobRunManifest, ApiError> {
        // Dropping this future (client gone) abandons the wait, never the build.
        let opts = WaitOptions::new(self.wait_timeout);
        let manifest = self.engine.jobs.submit(&submission, &opts).await?;
        Ok(manifest.as_ref().clone())
    }

    async fn get_build_task(
        &self,
        workspace: &WorkspaceId,
        id: &BuildTaskId,
    ) -> Result<Option<BuildTask>, ApiError> {
        Ok(self.engine.builds.get(workspace, id).await?)
    }

    async fn list_build_tasks(
        &self,
        query: BuildTaskQuery,
    ) -> Result<BuildTaskPage<BuildTask>, ApiError> {
        Ok(self.engine.builds.list(&query).await?)
    }

    async fn build_package(
        &self,
        workspace: &WorkspaceId,
        package: &PackageId,
    ) -> Result<BuildTaskView, ApiError> {
        let ticket = self
            .engine
            .builds
            .request_package_build(workspace, package)
            .await?;
        Ok(BuildTaskView {
            task: ticket.task,
            reused: ticket.reused,
        })
    }
}

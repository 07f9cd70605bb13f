use async_trait::async_trait;
use kiln_model::{
    BuildTask, BuildTaskId, BuildTaskPage, BuildTaskQuery, JobRunManifest, JobSubmission,
    PackageId, WorkspaceId,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// A build task as returned by a build request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTaskView {
    pub task: BuildTask,
    /// An existing task with the same fingerprint was returned.
    pub reused: bool,
}

/// Backend of the job and build task API.
///
/// [`crate::EngineAdapter`] delegates to a kiln engine; custom handlers can wrap it to add
/// authentication or rate limiting.
#[async_trait]
pub trait ApiHandler: Send + Sync + 'static {
    /// Resolve a submission and hand it to the scheduler.
    async fn submit_job(&self, submission: JobSubmission) -> Result<JobRunManifest, ApiError>;

    async fn get_build_task(
        &self,
        workspace: &WorkspaceId,
        id: &BuildTaskId,
    ) -> Result<Option<BuildTask>, ApiError>;

    async fn list_build_tasks(
        &self,
        query: BuildTaskQuery,
    ) -> Result<BuildTaskPage<BuildTask>, ApiError>;

    /// Find or create the build task of a package without waiting for it.
    async fn build_package(
        &self,
        workspace: &WorkspaceId,
        package: &PackageId,
    ) -> Result<BuildTaskView, ApiError>;
}

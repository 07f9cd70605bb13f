//! Boundaries to external collaborators.
//!
//! Every collaborator the engine talks to (catalog services, the image toolchain, the cluster
//! scheduler) is reached through one of these traits. In-memory implementations live in
//! [`crate::memory`].

use std::sync::Arc;

use async_trait::async_trait;
use kiln_model::{
    ArtifactRef, BuildOutput, BuildSpec, BuildTask, BuildTaskId, ClusterId, ClusterRef,
    EnvironmentSet, GitRepoId, GitRepoRef, JobRunManifest, LabelId, LabelRef, PackageArtifact,
    PackageId, PackageInfo, RegistryCredential, RegistryId, RegistryInfo, WorkspaceId,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// A collaborator could not be reached or answered with an error.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct PortError(pub String);

impl PortError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    async fn registry(&self, id: &RegistryId) -> Result<Option<RegistryInfo>, PortError>;

    /// Exact lookup: `workspace = None` asks for the platform-wide credential only.
    async fn credential(
        &self,
        registry: &RegistryId,
        workspace: Option<&WorkspaceId>,
    ) -> Result<Option<RegistryCredential>, PortError>;
}

#[async_trait]
pub trait EnvironmentCatalog: Send + Sync + 'static {
    /// Returns the named set only when it is visible to `workspace`.
    async fn environment(
        &self,
        workspace: &WorkspaceId,
        name: &str,
    ) -> Result<Option<EnvironmentSet>, PortError>;
}

#[async_trait]
pub trait LabelCatalog: Send + Sync + 'static {
    async fn label(&self, workspace: &WorkspaceId, id: &LabelId)
    -> Result<Option<LabelRef>, PortError>;

    async fn git_repo(
        &self,
        workspace: &WorkspaceId,
        id: &GitRepoId,
    ) -> Result<Option<GitRepoRef>, PortError>;
}

#[async_trait]
pub trait PackageCatalog: Send + Sync + 'static {
    async fn package(
        &self,
        workspace: &WorkspaceId,
        id: &PackageId,
    ) -> Result<Option<PackageInfo>, PortError>;
}

#[async_trait]
pub trait ClusterCatalog: Send + Sync + 'static {
    async fn cluster(
        &self,
        workspace: &WorkspaceId,
        id: &ClusterId,
    ) -> Result<Option<ClusterRef>, PortError>;
}

#[async_trait]
pub trait ArtifactStore: Send + Sync + 'static {
    async fn artifact_for_task(&self, id: &BuildTaskId)
    -> Result<Option<PackageArtifact>, PortError>;

    /// Store the artifact of a build task, replacing one recorded by an earlier attempt.
    async fn record(&self, artifact: PackageArtifact) -> Result<(), PortError>;
}

/// Error of a single toolchain invocation.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// Toolchain unavailable or crashed; another attempt may succeed.
    #[error("transient build error: {0}")]
    Transient(String),
    /// The build itself failed.
    #[error("build failed: {0}")]
    Failed(String),
    #[error("build cancelled")]
    Cancelled,
}

impl BuildError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BuildError::Transient(_))
    }
}

/// Runs a build spec with the container build toolchain.
#[async_trait]
pub trait ImageBuilder: Send + Sync + 'static {
    async fn build(
        &self,
        task: &BuildTask,
        spec: &BuildSpec,
        cancel: CancellationToken,
    ) -> Result<BuildOutput, BuildError>;
}

/// Error of a single push attempt.
#[derive(Debug, Clone, Error)]
pub enum PushError {
    #[error("transient push error: {0}")]
    Transient(String),
    #[error("push rejected: {0}")]
    Rejected(String),
    #[error("push cancelled")]
    Cancelled,
}

/// Destination of a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget {
    pub reference: ArtifactRef,
    /// The tag may already exist and must be replaced.
    pub overwrite: bool,
}

/// Pushes a locally built image to a registry.
#[async_trait]
pub trait ImagePusher: Send + Sync + 'static {
    async fn push(
        &self,
        output: &BuildOutput,
        target: &PushTarget,
        credential: &RegistryCredential,
        cancel: CancellationToken,
    ) -> Result<(), PushError>;
}

/// Places resolved jobs on a cluster.
#[async_trait]
pub trait ClusterScheduler: Send + Sync + 'static {
    async fn accept(&self, manifest: Arc<JobRunManifest>) -> Result<(), PortError>;
}

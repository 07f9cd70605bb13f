use kiln_model::{BuildTaskId, BuildTaskStatus, ClusterId, ErrorCode, PackageId};
use thiserror::Error;

use crate::{
    ports::PortError,
    publish::PublishError,
    resolve::{ArrayError, ReferenceError, ResourceError},
    spec::SpecError,
    state::StoreError,
};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("artifact store error: {0}")]
    Artifacts(#[source] PortError),

    #[error("spec error: {0}")]
    Spec(#[from] SpecError),

    #[error("illegal transition for task {id}: {from} -> {to}")]
    IllegalTransition {
        id: BuildTaskId,
        from: BuildTaskStatus,
        to: BuildTaskStatus,
    },

    #[error("build task {0} exhausted its retry budget")]
    RetryExhausted(BuildTaskId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::Spec(e) => e.code(),
            CoreError::RetryExhausted(_) => ErrorCode::InvalidPackage,
            _ => ErrorCode::UnknownError,
        }
    }
}

/// First fatal error of a job manifest resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("workspace id is empty")]
    InvalidWorkspace,

    #[error(transparent)]
    Resources(#[from] ResourceError),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    Array(#[from] ArrayError),

    #[error("invalid job arguments: {0}")]
    InvalidArguments(String),

    #[error("cluster {0} not found")]
    InvalidCluster(ClusterId),

    #[error("package {0} not found")]
    UnknownPackage(PackageId),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("package build {task} ended as {status}: {note}")]
    BuildUnsuccessful {
        task: BuildTaskId,
        status: BuildTaskStatus,
        note: String,
    },

    #[error("package build {task} did not finish within {waited_ms}ms")]
    WaitTimeout { task: BuildTaskId, waited_ms: u64 },

    #[error("waiting for package build {0} was cancelled")]
    Cancelled(BuildTaskId),

    #[error("catalog error: {0}")]
    Catalog(#[from] PortError),

    #[error("scheduler rejected the job: {0}")]
    Scheduler(#[source] PortError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ResolveError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ResolveError::InvalidWorkspace => ErrorCode::InvalidWorkspace,
            ResolveError::Resources(e) => e.code(),
            ResolveError::Reference(e) => e.code(),
            ResolveError::Array(e) => e.code(),
            ResolveError::InvalidArguments(_) => ErrorCode::InvalidJobArguments,
            ResolveError::InvalidCluster(_) => ErrorCode::InvalidCluster,
            ResolveError::UnknownPackage(_)
            | ResolveError::BuildUnsuccessful { .. }
            | ResolveError::WaitTimeout { .. } => ErrorCode::InvalidPackage,
            ResolveError::Publish(e) => e.code(),
            ResolveError::Cancelled(_)
            | ResolveError::Catalog(_)
            | ResolveError::Scheduler(_) => ErrorCode::UnknownError,
            ResolveError::Core(e) => e.code(),
        }
    }
}

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::time_serde;
use crate::{BuildClassId, BuildTaskId, BuildTaskStatus, PackageId, RegistryId, WorkspaceId};

/// A build task row.
///
/// Rows are created on a package-build request and mutated only by the build machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTask {
    pub id: BuildTaskId,
    pub workspace_id: WorkspaceId,
    pub package_id: PackageId,
    /// Package build strategy.
    pub class: BuildClassId,
    /// Rendered build instructions.
    pub spec: String,
    /// Reuse key over package, class and spec.
    pub fingerprint: String,
    /// Registry the artifact is published to.
    pub registry_id: RegistryId,
    pub status: BuildTaskStatus,
    /// Deadline of the current status; always `None` once terminal.
    #[serde(default, with = "time_serde::option", skip_serializing_if = "Option::is_none")]
    pub deadline: Option<SystemTime>,
    /// Short human-readable cause of the last transition.
    pub last_activity: String,
    #[serde(with = "time_serde")]
    pub created: SystemTime,
    #[serde(with = "time_serde")]
    pub updated: SystemTime,
}

impl BuildTask {
    /// Returns `true` if the task has a deadline strictly before `now`.
    pub fn is_overdue(&self, now: SystemTime) -> bool {
        self.deadline.is_some_and(|deadline| deadline < now)
    }
}

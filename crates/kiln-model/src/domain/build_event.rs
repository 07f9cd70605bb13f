use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::time_serde;
use crate::{BuildTaskId, BuildTaskStatus, WorkspaceId};

/// A committed build task transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildEvent {
    pub task_id: BuildTaskId,
    pub workspace_id: WorkspaceId,
    /// `None` when the task was just created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<BuildTaskStatus>,
    pub to: BuildTaskStatus,
    pub note: String,
    #[serde(with = "time_serde")]
    pub at: SystemTime,
    /// Time spent in `Running` when the event leaves that state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_ms: Option<u64>,
}

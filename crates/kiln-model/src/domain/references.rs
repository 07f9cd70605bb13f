use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ClusterId, GitRepoId, LabelId, WorkspaceId};

/// Label attached to a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelRef {
    pub id: LabelId,
    pub name: String,
}

/// Git repository a job was submitted from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitRepoRef {
    pub id: GitRepoId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// Cluster a job is placed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRef {
    pub id: ClusterId,
    pub name: String,
}

/// Named set of environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSet {
    pub name: String,
    /// `None` marks a set visible to every workspace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<WorkspaceId>,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl EnvironmentSet {
    pub fn is_visible_to(&self, workspace: &WorkspaceId) -> bool {
        self.workspace_id.as_ref().is_none_or(|ws| ws == workspace)
    }
}

use serde::{Deserialize, Serialize};

use crate::{
    ArrayPlan, ArraySpec, ArtifactRef, BuildTaskId, ClusterId, EnvPlan, EnvironmentMap, GitRepoId,
    GitRepoRef, LabelId, LabelRef, PackageId, RunResources, RunResourcesSpec, WorkspaceId,
};

/// Raw job submission, as received from clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmission {
    pub workspace_id: WorkspaceId,
    pub package_id: PackageId,
    pub cluster_id: ClusterId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repo_id: Option<GitRepoId>,
    #[serde(default)]
    pub label_ids: Vec<LabelId>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub array: ArraySpec,
    #[serde(default)]
    pub env: EnvPlan,
    #[serde(default)]
    pub resources: RunResourcesSpec,
}

/// Fully resolved job specification handed to the cluster scheduler.
///
/// Built once per submission; never modified after resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRunManifest {
    pub workspace_id: WorkspaceId,
    pub cluster_id: ClusterId,
    pub package_id: PackageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repo: Option<GitRepoRef>,
    pub labels: Vec<LabelRef>,
    pub args: Vec<String>,
    pub array: ArrayPlan,
    pub env: EnvironmentMap,
    pub resources: RunResources,
    pub artifact: ArtifactRef,
    pub build_task_id: BuildTaskId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_defaults_optional_sections() {
        let json = r#"{"workspaceId":"ws","packageId":"pkg","clusterId":"c1"}"#;
        let sub: JobSubmission = serde_json::from_str(json).unwrap();

        assert!(sub.label_ids.is_empty());
        assert!(sub.git_repo_id.is_none());
        assert_eq!(sub.array, ArraySpec::default());
        assert!(sub.env.use_sets.is_empty());
        assert!(sub.resources.requests.cpu.is_none());
    }

    #[test]
    fn submission_reads_nested_sections() {
        let json = r#"{
            "workspaceId": "ws",
            "packageId": "pkg",
            "clusterId": "c1",
            "labelIds": ["l1", "l2"],
            "args": ["--epochs", "3"],
            "array": {"replicas": 4, "indexer": "counter", "counter": 7},
            "env": {"use": ["base"], "override": {"MODE": "fast"}},
            "resources": {"requests": {"cpu": "500m"}, "limits": {"memory": "2Gi", "nvidiaGpu": "1"}}
        }"#;
        let sub: JobSubmission = serde_json::from_str(json).unwrap();

        assert_eq!(sub.label_ids.len(), 2);
        assert_eq!(sub.array.replicas, Some(4));
        assert_eq!(sub.array.counter, Some(7));
        assert_eq!(sub.resources.limits.nvidia_gpu.as_deref(), Some("1"));
        assert_eq!(sub.env.overrides.len(), 1);
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{BuildTaskId, PackageId, WorkspaceId};

/// Registry-addressable image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRef {
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

/// Artifact produced by a successful build task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageArtifact {
    pub package_id: PackageId,
    pub workspace_id: WorkspaceId,
    pub image: ArtifactRef,
    pub build_task_id: BuildTaskId,
}

/// Handle to a locally built image, before it is pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOutput {
    /// Toolchain-specific image handle (digest, archive path, ...).
    pub image: String,
    pub fingerprint: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_ref_display() {
        let r = ArtifactRef {
            registry: "registry.local:5000".into(),
            repository: "ws/pkg".into(),
            tag: "fp-0123456789ab".into(),
        };
        assert_eq!(r.to_string(), "registry.local:5000/ws/pkg:fp-0123456789ab");
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{BuildClassId, PackageId, RegistryId, WorkspaceId};

/// Inputs a build class renders into a build spec.
///
/// Ordered collections keep rendering deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInputs {
    /// Source location (archive URL, git URL, local path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Declared runtime (e.g. `"python:3.12"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Extra template variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, String>,
}

/// A package as seen by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    pub id: PackageId,
    pub workspace_id: WorkspaceId,
    pub class: BuildClassId,
    pub registry_id: RegistryId,
    #[serde(default)]
    pub inputs: BuildInputs,
}

/// Concrete, executable build specification produced by a build class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSpec {
    pub class: BuildClassId,
    pub content: String,
}

use serde::{Deserialize, Serialize};

/// Raw quantity strings for one side (requests or limits) of a resource spec.
///
/// Each field is either absent/empty (unset) or a quantity such as `"500m"`, `"2Gi"` or `"1"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuantities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nvidia_gpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amd_gpu: Option<String>,
}

/// Raw resource requests and limits as submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResourcesSpec {
    #[serde(default)]
    pub requests: ResourceQuantities,
    #[serde(default)]
    pub limits: ResourceQuantities,
}

/// Normalized quantities in base units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_millis: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nvidia_gpu: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amd_gpu: Option<u64>,
}

impl ResourceSet {
    pub fn is_empty(&self) -> bool {
        self.cpu_millis.is_none()
            && self.memory_bytes.is_none()
            && self.nvidia_gpu.is_none()
            && self.amd_gpu.is_none()
    }
}

/// Validated resource requests and limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResources {
    pub requests: ResourceSet,
    pub limits: ResourceSet,
}

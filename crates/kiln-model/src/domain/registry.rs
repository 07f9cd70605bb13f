use serde::{Deserialize, Serialize};

use crate::{RegistryId, WorkspaceId};

/// Container registry known to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryInfo {
    pub id: RegistryId,
    /// Host (and optional port) images are pushed to.
    pub address: String,
}

/// Credential used to talk to a registry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCredential {
    pub registry_id: RegistryId,
    /// `None` marks a platform-wide credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<WorkspaceId>,
    pub username: String,
    pub password_encrypted: String,
    #[serde(default)]
    pub pull_allowed: bool,
    #[serde(default)]
    pub push_allowed: bool,
}

impl std::fmt::Debug for RegistryCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredential")
            .field("registry_id", &self.registry_id)
            .field("workspace_id", &self.workspace_id)
            .field("username", &self.username)
            .field("password_encrypted", &"***")
            .field("pull_allowed", &self.pull_allowed)
            .field("push_allowed", &self.push_allowed)
            .finish()
    }
}

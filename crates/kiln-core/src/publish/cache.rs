use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime},
};

use kiln_model::{RegistryCredential, RegistryId, WorkspaceId};
use tracing::trace;

use crate::{
    clock::Clock,
    ports::{CredentialStore, PortError},
};

type Key = (RegistryId, Option<WorkspaceId>);

struct Entry {
    fetched: SystemTime,
    value: Option<RegistryCredential>,
}

/// Short-lived cache in front of a [`CredentialStore`].
///
/// Misses are cached as well, so a workspace without its own credential does not hit the store on
/// every push.
pub struct CredentialCache {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: Mutex<HashMap<Key, Entry>>,
}

impl CredentialCache {
    pub fn new(store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, key: &Key) -> Option<Option<RegistryCredential>> {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get(key)?;
        let age = now.duration_since(entry.fetched).unwrap_or_default();
        (age < self.ttl).then(|| entry.value.clone())
    }

    /// Exact lookup through the cache.
    pub async fn get(
        &self,
        registry: &RegistryId,
        workspace: Option<&WorkspaceId>,
    ) -> Result<Option<RegistryCredential>, PortError> {
        let key = (registry.clone(), workspace.cloned());
        if let Some(hit) = self.cached(&key) {
            trace!(registry = %registry, "credential cache hit");
            return Ok(hit);
        }

        let value = self.store.credential(registry, workspace).await?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key,
            Entry {
                fetched: self.clock.now(),
                value: value.clone(),
            },
        );
        Ok(value)
    }

    /// Workspace credential, falling back to the platform-wide one.
    pub async fn resolve(
        &self,
        registry: &RegistryId,
        workspace: &WorkspaceId,
    ) -> Result<Option<RegistryCredential>, PortError> {
        if let Some(cred) = self.get(registry, Some(workspace)).await? {
            return Ok(Some(cred));
        }
        self.get(registry, None).await
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

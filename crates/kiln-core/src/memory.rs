//! In-memory catalog and scheduler implementations.
//!
//! Used by tests and by the reference daemon, which seeds a [`MemoryCatalog`] from a JSON file.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_trait::async_trait;
use kiln_model::{
    BuildTaskId, ClusterId, ClusterRef, EnvironmentSet, GitRepoId, GitRepoRef, JobRunManifest,
    LabelId, LabelRef, PackageArtifact, PackageId, PackageInfo, RegistryCredential, RegistryId,
    RegistryInfo, WorkspaceId,
};
use serde::{Deserialize, Serialize};

use crate::ports::{
    ArtifactStore, ClusterCatalog, ClusterScheduler, CredentialStore, EnvironmentCatalog,
    LabelCatalog, PackageCatalog, PortError,
};

/// Workspace-scoped entry of a seed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scoped<T> {
    pub workspace_id: WorkspaceId,
    #[serde(flatten)]
    pub item: T,
}

/// Serialized form of a [`MemoryCatalog`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogSeed {
    pub registries: Vec<RegistryInfo>,
    pub credentials: Vec<RegistryCredential>,
    pub environments: Vec<EnvironmentSet>,
    pub labels: Vec<Scoped<LabelRef>>,
    pub git_repos: Vec<Scoped<GitRepoRef>>,
    pub clusters: Vec<Scoped<ClusterRef>>,
    pub packages: Vec<PackageInfo>,
}

#[derive(Default)]
struct CatalogInner {
    registries: HashMap<RegistryId, RegistryInfo>,
    credentials: HashMap<(RegistryId, Option<WorkspaceId>), RegistryCredential>,
    environments: HashMap<String, Vec<EnvironmentSet>>,
    labels: HashMap<(WorkspaceId, LabelId), LabelRef>,
    git_repos: HashMap<(WorkspaceId, GitRepoId), GitRepoRef>,
    clusters: HashMap<(WorkspaceId, ClusterId), ClusterRef>,
    packages: HashMap<(WorkspaceId, PackageId), PackageInfo>,
    artifacts: HashMap<BuildTaskId, PackageArtifact>,
}

/// Every catalog port backed by hash maps.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    inner: Arc<RwLock<CatalogInner>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: CatalogSeed) -> Self {
        let cat = Self::new();
        seed.registries.into_iter().for_each(|r| cat.add_registry(r));
        seed.credentials.into_iter().for_each(|c| cat.add_credential(c));
        seed.environments.into_iter().for_each(|e| cat.add_environment(e));
        for l in seed.labels {
            cat.add_label(l.workspace_id, l.item);
        }
        for g in seed.git_repos {
            cat.add_git_repo(g.workspace_id, g.item);
        }
        for c in seed.clusters {
            cat.add_cluster(c.workspace_id, c.item);
        }
        seed.packages.into_iter().for_each(|p| cat.add_package(p));
        cat
    }

    fn read(&self) -> RwLockReadGuard<'_, CatalogInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_registry(&self, registry: RegistryInfo) {
        self.write().registries.insert(registry.id.clone(), registry);
    }

    pub fn add_credential(&self, cred: RegistryCredential) {
        let key = (cred.registry_id.clone(), cred.workspace_id.clone());
        self.write().credentials.insert(key, cred);
    }

    pub fn add_environment(&self, set: EnvironmentSet) {
        self.write()
            .environments
            .entry(set.name.clone())
            .or_default()
            .push(set);
    }

    pub fn add_label(&self, workspace: WorkspaceId, label: LabelRef) {
        self.write()
            .labels
            .insert((workspace, label.id.clone()), label);
    }

    pub fn add_git_repo(&self, workspace: WorkspaceId, repo: GitRepoRef) {
        self.write()
            .git_repos
            .insert((workspace, repo.id.clone()), repo);
    }

    pub fn add_cluster(&self, workspace: WorkspaceId, cluster: ClusterRef) {
        self.write()
            .clusters
            .insert((workspace, cluster.id.clone()), cluster);
    }

    pub fn add_package(&self, package: PackageInfo) {
        let key = (package.workspace_id.clone(), package.id.clone());
        self.write().packages.insert(key, package);
    }

    pub fn artifact_count(&self) -> usize {
        self.read().artifacts.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryCatalog {
    async fn registry(&self, id: &RegistryId) -> Result<Option<RegistryInfo>, PortError> {
        Ok(self.read().registries.get(id).cloned())
    }

    async fn credential(
        &self,
        registry: &RegistryId,
        workspace: Option<&WorkspaceId>,
    ) -> Result<Option<RegistryCredential>, PortError> {
        let key = (registry.clone(), workspace.cloned());
        Ok(self.read().credentials.get(&key).cloned())
    }
}

#[async_trait]
impl EnvironmentCatalog for MemoryCatalog {
    async fn environment(
        &self,
        workspace: &WorkspaceId,
        name: &str,
    ) -> Result<Option<EnvironmentSet>, PortError> {
        let inner = self.read();
        let Some(sets) = inner.environments.get(name) else {
            return Ok(None);
        };
        // a workspace's own set shadows a global one of the same name
        let own = sets
            .iter()
            .find(|s| s.workspace_id.as_ref() == Some(workspace));
        let global = sets.iter().find(|s| s.workspace_id.is_none());
        Ok(own.or(global).cloned())
    }
}

#[async_trait]
impl LabelCatalog for MemoryCatalog {
    async fn label(
        &self,
        workspace: &WorkspaceId,
        id: &LabelId,
    ) -> Result<Option<LabelRef>, PortError> {
        Ok(self
            .read()
            .labels
            .get(&(workspace.clone(), id.clone()))
            .cloned())
    }

    async fn git_repo(
        &self,
        workspace: &WorkspaceId,
        id: &GitRepoId,
    ) -> Result<Option<GitRepoRef>, PortError> {
        Ok(self
            .read()
            .git_repos
            .get(&(workspace.clone(), id.clone()))
            .cloned())
    }
}

#[async_trait]
impl PackageCatalog for MemoryCatalog {
    async fn package(
        &self,
        workspace: &WorkspaceId,
        id: &PackageId,
    ) -> Result<Option<PackageInfo>, PortError> {
        Ok(self
            .read()
            .packages
            .get(&(workspace.clone(), id.clone()))
            .cloned())
    }
}

#[async_trait]
impl ClusterCatalog for MemoryCatalog {
    async fn cluster(
        &self,
        workspace: &WorkspaceId,
        id: &ClusterId,
    ) -> Result<Option<ClusterRef>, PortError> {
        Ok(self
            .read()
            .clusters
            .get(&(workspace.clone(), id.clone()))
            .cloned())
    }
}

#[async_trait]
impl ArtifactStore for MemoryCatalog {
    async fn artifact_for_task(
        &self,
        id: &BuildTaskId,
    ) -> Result<Option<PackageArtifact>, PortError> {
        Ok(self.read().artifacts.get(id).cloned())
    }

    async fn record(&self, artifact: PackageArtifact) -> Result<(), PortError> {
        self.write()
            .artifacts
            .insert(artifact.build_task_id.clone(), artifact);
        Ok(())
    }
}

/// Scheduler that keeps every accepted manifest.
#[derive(Clone, Default)]
pub struct MemoryScheduler {
    accepted: Arc<RwLock<Vec<Arc<JobRunManifest>>>>,
}

impl MemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accepted(&self) -> Vec<Arc<JobRunManifest>> {
        self.accepted
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ClusterScheduler for MemoryScheduler {
    async fn accept(&self, manifest: Arc<JobRunManifest>) -> Result<(), PortError> {
        self.accepted
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(manifest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use kiln_model::ArtifactRef;

    use super::*;

    #[tokio::test]
    async fn seed_round_trips_through_json() {
        let raw = r#"{
            "registries": [{"id": "reg", "address": "registry.local:5000"}],
            "credentials": [{"registryId": "reg", "username": "bot", "passwordEncrypted": "x", "pushAllowed": true}],
            "labels": [{"workspaceId": "ws", "id": "l1", "name": "gpu"}],
            "clusters": [{"workspaceId": "ws", "id": "c1", "name": "lab"}],
            "packages": [{"id": "pkg", "workspaceId": "ws", "class": "python-pip", "registryId": "reg"}]
        }"#;
        let seed: CatalogSeed = serde_json::from_str(raw).unwrap();
        let cat = MemoryCatalog::from_seed(seed);
        let ws = WorkspaceId::from("ws");

        assert!(cat.registry(&RegistryId::from("reg")).await.unwrap().is_some());
        assert!(cat
            .credential(&RegistryId::from("reg"), None)
            .await
            .unwrap()
            .is_some());
        assert_eq!(
            cat.label(&ws, &LabelId::from("l1")).await.unwrap().unwrap().name,
            "gpu"
        );
        assert!(cat.cluster(&ws, &ClusterId::from("c1")).await.unwrap().is_some());
        assert!(cat.package(&ws, &PackageId::from("pkg")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn own_environment_shadows_global() {
        let cat = MemoryCatalog::new();
        for ws in [None, Some("ws")] {
            cat.add_environment(EnvironmentSet {
                name: "base".into(),
                workspace_id: ws.map(WorkspaceId::from),
                values: [("WHO".to_string(), ws.unwrap_or("global").to_string())].into(),
            });
        }

        let own = cat
            .environment(&WorkspaceId::from("ws"), "base")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(own.values["WHO"], "ws");

        let other = cat
            .environment(&WorkspaceId::from("other"), "base")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(other.values["WHO"], "global");
    }

    #[tokio::test]
    async fn rerecording_an_artifact_replaces_it() {
        let cat = MemoryCatalog::new();
        let artifact = PackageArtifact {
            package_id: PackageId::from("pkg"),
            workspace_id: WorkspaceId::from("ws"),
            image: ArtifactRef {
                registry: "r".into(),
                repository: "ws/pkg".into(),
                tag: "t".into(),
            },
            build_task_id: BuildTaskId::from("t1"),
        };
        cat.record(artifact.clone()).await.unwrap();

        let mut rebuilt = artifact.clone();
        rebuilt.image.tag = "t2".into();
        cat.record(rebuilt).await.unwrap();
        assert_eq!(cat.artifact_count(), 1);
        let stored = cat.artifact_for_task(&artifact.build_task_id).await.unwrap().unwrap();
        assert_eq!(stored.image.tag, "t2");
    }
}

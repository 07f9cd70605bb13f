use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_trait::async_trait;
use kiln_model::{BuildTask, BuildTaskId, BuildTaskPage, BuildTaskQuery, BuildTaskStatus, WorkspaceId};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("build task {0} not found")]
    NotFound(BuildTaskId),
    #[error("build task {0} already exists")]
    Duplicate(BuildTaskId),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Persistence of build task rows.
///
/// Only the build machine writes through this trait.
#[async_trait]
pub trait BuildTaskStore: Send + Sync + 'static {
    async fn insert(&self, task: BuildTask) -> Result<(), StoreError>;

    async fn get(&self, id: &BuildTaskId) -> Result<Option<BuildTask>, StoreError>;

    /// Replace an existing row.
    async fn update(&self, task: BuildTask) -> Result<(), StoreError>;

    /// Most recently created task of a workspace with the given fingerprint.
    async fn find_by_fingerprint(
        &self,
        workspace: &WorkspaceId,
        fingerprint: &str,
    ) -> Result<Option<BuildTask>, StoreError>;

    /// Tasks in `status`, oldest first.
    async fn list_by_status(&self, status: BuildTaskStatus) -> Result<Vec<BuildTask>, StoreError>;

    async fn query(&self, q: &BuildTaskQuery) -> Result<BuildTaskPage<BuildTask>, StoreError>;
}

/// In-memory build task storage.
#[derive(Clone, Default)]
pub struct MemoryTaskStore {
    inner: Arc<RwLock<MemoryTaskStoreInner>>,
}

#[derive(Default)]
struct MemoryTaskStoreInner {
    /// Tasks indexed by id.
    tasks: HashMap<BuildTaskId, BuildTask>,
    /// Index: workspace -> task ids in creation order.
    by_workspace: HashMap<WorkspaceId, Vec<BuildTaskId>>,
    /// Index: (workspace, fingerprint) -> latest task id.
    by_fingerprint: HashMap<(WorkspaceId, String), BuildTaskId>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryTaskStoreInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryTaskStoreInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn oldest_first(a: &BuildTask, b: &BuildTask) -> std::cmp::Ordering {
    a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl BuildTaskStore for MemoryTaskStore {
    async fn insert(&self, task: BuildTask) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner.tasks.contains_key(&task.id) {
            return Err(StoreError::Duplicate(task.id));
        }

        inner
            .by_workspace
            .entry(task.workspace_id.clone())
            .or_default()
            .push(task.id.clone());
        inner.by_fingerprint.insert(
            (task.workspace_id.clone(), task.fingerprint.clone()),
            task.id.clone(),
        );
        inner.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn get(&self, id: &BuildTaskId) -> Result<Option<BuildTask>, StoreError> {
        Ok(self.read().tasks.get(id).cloned())
    }

    async fn update(&self, task: BuildTask) -> Result<(), StoreError> {
        let mut inner = self.write();
        match inner.tasks.get_mut(&task.id) {
            Some(slot) => {
                *slot = task;
                Ok(())
            }
            None => Err(StoreError::NotFound(task.id)),
        }
    }

    async fn find_by_fingerprint(
        &self,
        workspace: &WorkspaceId,
        fingerprint: &str,
    ) -> Result<Option<BuildTask>, StoreError> {
        let inner = self.read();
        Ok(inner
            .by_fingerprint
            .get(&(workspace.clone(), fingerprint.to_string()))
            .and_then(|id| inner.tasks.get(id))
            .cloned())
    }

    async fn list_by_status(&self, status: BuildTaskStatus) -> Result<Vec<BuildTask>, StoreError> {
        let inner = self.read();
        let mut out: Vec<BuildTask> = inner
            .tasks
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        out.sort_by(oldest_first);
        Ok(out)
    }

    /// Filters are applied inside a single read lock.
    /// When `workspace` is specified, the `by_workspace` index narrows the scan.
    /// `total` reflects the count after filtering, before pagination.
    async fn query(&self, q: &BuildTaskQuery) -> Result<BuildTaskPage<BuildTask>, StoreError> {
        let inner = self.read();

        let mut filtered: Vec<&BuildTask> = match &q.workspace {
            Some(ws) => match inner.by_workspace.get(ws) {
                Some(ids) => ids.iter().filter_map(|id| inner.tasks.get(id)).collect(),
                None => {
                    return Ok(BuildTaskPage {
                        items: vec![],
                        total: 0,
                    });
                }
            },
            None => {
                let mut all: Vec<&BuildTask> = inner.tasks.values().collect();
                all.sort_by(|a, b| oldest_first(a, b));
                all
            }
        };

        if let Some(status) = q.status {
            filtered.retain(|t| t.status == status);
        }
        let total = filtered.len();

        let items = filtered
            .into_iter()
            .skip(q.offset)
            .take(q.limit)
            .cloned()
            .collect();

        Ok(BuildTaskPage { items, total })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use kiln_model::{PackageId, RegistryId};

    use super::*;

    fn task(id: &str, ws: &str, fp: &str, created_s: u64) -> BuildTask {
        let created = UNIX_EPOCH + Duration::from_secs(created_s);
        BuildTask {
            id: BuildTaskId::from(id),
            workspace_id: WorkspaceId::from(ws),
            package_id: PackageId::from("pkg"),
            class: "python-pip".into(),
            spec: "FROM python".into(),
            fingerprint: fp.into(),
            registry_id: RegistryId::from("reg"),
            status: BuildTaskStatus::Pending,
            deadline: Some(created + Duration::from_secs(60)),
            last_activity: "queued".into(),
            created,
            updated: created,
        }
    }

    async fn set_status(store: &MemoryTaskStore, id: &str, status: BuildTaskStatus) {
        let mut t = store.get(&BuildTaskId::from(id)).await.unwrap().unwrap();
        t.status = status;
        t.updated = SystemTime::now();
        store.update(t).await.unwrap();
    }

    async fn setup_query_store() -> MemoryTaskStore {
        let store = MemoryTaskStore::new();
        // ws-a: 3 tasks (2 running, 1 pending)
        store.insert(task("a1", "ws-a", "f1", 1)).await.unwrap();
        store.insert(task("a2", "ws-a", "f2", 2)).await.unwrap();
        store.insert(task("a3", "ws-a", "f3", 3)).await.unwrap();
        set_status(&store, "a1", BuildTaskStatus::Running).await;
        set_status(&store, "a2", BuildTaskStatus::Running).await;

        // ws-b: 2 tasks (1 failed, 1 pending)
        store.insert(task("b1", "ws-b", "f1", 4)).await.unwrap();
        store.insert(task("b2", "ws-b", "f5", 5)).await.unwrap();
        set_status(&store, "b1", BuildTaskStatus::Failed).await;

        store
    }

    #[tokio::test]
    async fn insert_and_get_task() {
        let store = MemoryTaskStore::new();
        store.insert(task("t1", "ws", "fp", 1)).await.unwrap();

        let got = store.get(&BuildTaskId::from("t1")).await.unwrap().unwrap();
        assert_eq!(got.status, BuildTaskStatus::Pending);
        assert_eq!(got.workspace_id, WorkspaceId::from("ws"));
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = MemoryTaskStore::new();
        store.insert(task("t1", "ws", "fp", 1)).await.unwrap();
        let err = store.insert(task("t1", "ws", "fp", 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn update_missing_task_fails() {
        let store = MemoryTaskStore::new();
        let err = store.update(task("ghost", "ws", "fp", 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn fingerprint_lookup_is_scoped_by_workspace() {
        let store = setup_query_store().await;

        let a = store
            .find_by_fingerprint(&WorkspaceId::from("ws-a"), "f1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.id, BuildTaskId::from("a1"));

        let b = store
            .find_by_fingerprint(&WorkspaceId::from("ws-b"), "f1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(b.id, BuildTaskId::from("b1"));

        assert!(store
            .find_by_fingerprint(&WorkspaceId::from("ws-a"), "f5")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn list_by_status_is_oldest_first() {
        let store = setup_query_store().await;
        let pending = store.list_by_status(BuildTaskStatus::Pending).await.unwrap();
        let ids: Vec<_> = pending.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a3", "b2"]);
    }

    #[tokio::test]
    async fn query_no_filters_returns_all() {
        let store = setup_query_store().await;
        let page = store.query(&BuildTaskQuery::new()).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 5);
    }

    #[tokio::test]
    async fn query_by_workspace_and_status() {
        let store = setup_query_store().await;
        let page = store
            .query(
                &BuildTaskQuery::new()
                    .with_workspace("ws-a")
                    .with_status(BuildTaskStatus::Running),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert!(page.items.iter().all(|t| t.status == BuildTaskStatus::Running));
    }

    #[tokio::test]
    async fn query_unknown_workspace_returns_empty() {
        let store = setup_query_store().await;
        let page = store
            .query(&BuildTaskQuery::new().with_workspace("nope"))
            .await
            .unwrap();
        assert_eq!(page.total, 0);
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn query_pagination_offset_and_limit() {
        let store = setup_query_store().await;
        let page = store
            .query(&BuildTaskQuery::new().with_limit(2).with_offset(2))
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        let ids: Vec<_> = page.items.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a3", "b1"]);
    }

    #[tokio::test]
    async fn query_offset_beyond_total() {
        let store = setup_query_store().await;
        let page = store
            .query(&BuildTaskQuery::new().with_offset(100))
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert!(page.items.is_empty());
    }
}

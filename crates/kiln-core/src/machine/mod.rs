//! Build task state machine.
//!
//! ```text
//! Pending ──promote──► Running ──► Succeeded
//!    │                    │
//!    └──── deadline ──────┴──────► TimedOut / Failed
//!
//! Failed / TimedOut ──retry (policy)──► Pending
//! ```
//!
//! Every write to a task goes through [`BuildMachine`]. Writes for one task id are serialized by a
//! keyed lock, and a write against a terminal task is discarded, so the first terminal writer wins.
//!
//! Each `Start` opens a new [`RunId`]. Reports of a run go through [`BuildMachine::apply_for_run`]
//! and are discarded once that run is no longer the task's current one, e.g. after it timed out
//! and the task was re-queued.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::SystemTime,
};

use kiln_model::{
    BuildEvent, BuildSpec, BuildTask, BuildTaskId, BuildTaskPage, BuildTaskQuery,
    BuildTaskStatus, PackageArtifact, PackageId, RegistryId, WorkspaceId,
};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    clock::Clock,
    config::{BuildConfig, RetryPolicy},
    error::CoreError,
    locks::KeyedLocks,
    ports::ArtifactStore,
    spec::fingerprint,
    state::{BuildTaskStore, StoreError},
    subscriber::BuildSubscriber,
};

mod runner;
pub use runner::BuildRunner;

mod sweep;
pub use sweep::{SweepReport, Sweeper};

pub const NOTE_QUEUED: &str = "queued";
pub const NOTE_STARTED: &str = "build started";
pub const NOTE_SUCCEEDED: &str = "artifact published";
pub const NOTE_INTERRUPTED: &str = "interrupted";
pub const NOTE_RETRY_EXHAUSTED: &str = "retry budget exhausted";

/// A requested change of a task's status.
#[derive(Debug, Clone)]
pub enum Transition {
    /// `Pending -> Running`.
    Start,
    /// `Running -> Succeeded`, recording the artifact in the same commit.
    Succeed(PackageArtifact),
    /// `Pending | Running -> Failed`.
    Fail(String),
    /// `Pending | Running -> TimedOut`; only applied while the deadline has passed.
    TimeOut(String),
}

impl Transition {
    pub fn target(&self) -> BuildTaskStatus {
        match self {
            Transition::Start => BuildTaskStatus::Running,
            Transition::Succeed(_) => BuildTaskStatus::Succeeded,
            Transition::Fail(_) => BuildTaskStatus::Failed,
            Transition::TimeOut(_) => BuildTaskStatus::TimedOut,
        }
    }

    fn allowed_from(&self, from: BuildTaskStatus) -> bool {
        use BuildTaskStatus::*;
        matches!(
            (self, from),
            (Transition::Start, Pending)
                | (Transition::Succeed(_), Running)
                | (Transition::Fail(_) | Transition::TimeOut(_), Pending | Running)
        )
    }
}

/// Result of [`BuildMachine::apply`].
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// The transition was committed; carries the new row.
    Applied(BuildTask),
    /// The task was already terminal (or no longer overdue); carries the current row.
    Discarded(BuildTask),
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }

    pub fn task(&self) -> &BuildTask {
        match self {
            TransitionOutcome::Applied(t) | TransitionOutcome::Discarded(t) => t,
        }
    }
}

/// Identity of one execution of a task, opened by `Start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// The in-flight run of a `Running` task.
#[derive(Debug, Clone)]
pub struct ActiveRun {
    pub id: RunId,
    pub cancel: CancellationToken,
}

/// A package build to find or create.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub workspace_id: WorkspaceId,
    pub package_id: PackageId,
    pub registry_id: RegistryId,
    pub spec: BuildSpec,
}

/// Task returned for a build request.
#[derive(Debug, Clone)]
pub struct BuildTicket {
    pub task: BuildTask,
    /// `false` when a new task was created or a failed one was re-queued.
    pub reused: bool,
}

pub struct BuildMachine {
    store: Arc<dyn BuildTaskStore>,
    artifacts: Arc<dyn ArtifactStore>,
    clock: Arc<dyn Clock>,
    config: BuildConfig,
    subscribers: Vec<Arc<dyn BuildSubscriber>>,

    task_locks: KeyedLocks<BuildTaskId>,
    fingerprint_locks: KeyedLocks<(WorkspaceId, String)>,
    promote_lock: AsyncMutex<()>,

    /// Retries granted per task; kept outside the task row.
    retries: Mutex<HashMap<BuildTaskId, u32>>,
    /// In-flight runs, opened on `Start` and closed by the terminal commit.
    runs: Mutex<HashMap<BuildTaskId, ActiveRun>>,
    next_run: AtomicU64,

    /// Signalled after every commit.
    changed: Notify,
    /// Signalled when work for the sweeper appears.
    wakeup: Notify,
}

impl BuildMachine {
    pub fn new(
        store: Arc<dyn BuildTaskStore>,
        artifacts: Arc<dyn ArtifactStore>,
        clock: Arc<dyn Clock>,
        config: BuildConfig,
    ) -> Self {
        Self {
            store,
            artifacts,
            clock,
            config,
            subscribers: Vec::new(),
            task_locks: KeyedLocks::new(),
            fingerprint_locks: KeyedLocks::new(),
            promote_lock: AsyncMutex::new(()),
            retries: Mutex::new(HashMap::new()),
            runs: Mutex::new(HashMap::new()),
            next_run: AtomicU64::new(1),
            changed: Notify::new(),
            wakeup: Notify::new(),
        }
    }

    pub fn with_subscriber(mut self, subscriber: Arc<dyn BuildSubscriber>) -> Self {
        debug!(subscriber = subscriber.name(), "build subscriber registered");
        self.subscribers.push(subscriber);
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        &self.artifacts
    }

    /// Notified after every committed transition.
    pub fn changes(&self) -> &Notify {
        &self.changed
    }

    /// Notified when tasks may be ready for promotion.
    pub fn wakeups(&self) -> &Notify {
        &self.wakeup
    }

    pub fn wake(&self) {
        self.wakeup.notify_one();
    }

    pub async fn get(&self, id: &BuildTaskId) -> Result<Option<BuildTask>, CoreError> {
        Ok(self.store.get(id).await?)
    }

    pub async fn query(&self, q: &BuildTaskQuery) -> Result<BuildTaskPage<BuildTask>, CoreError> {
        Ok(self.store.query(q).await?)
    }

    /// Retries granted so far for `id`.
    pub fn retries_of(&self, id: &BuildTaskId) -> u32 {
        let retries = self.retries.lock().unwrap_or_else(|e| e.into_inner());
        retries.get(id).copied().unwrap_or(0)
    }

    /// Cancellation token of the in-flight run of `id`, if any.
    pub fn run_token(&self, id: &BuildTaskId) -> Option<CancellationToken> {
        self.active_run(id).map(|run| run.cancel)
    }

    /// The in-flight run of `id`, if any.
    pub fn active_run(&self, id: &BuildTaskId) -> Option<ActiveRun> {
        let runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        runs.get(id).cloned()
    }

    /// Cancel every in-flight run without committing anything.
    pub fn cancel_runs(&self) {
        let runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        for run in runs.values() {
            run.cancel.cancel();
        }
    }

    fn open_run(&self, id: &BuildTaskId) -> RunId {
        let run = ActiveRun {
            id: RunId(self.next_run.fetch_add(1, Ordering::Relaxed)),
            cancel: CancellationToken::new(),
        };
        let run_id = run.id;
        self.runs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), run);
        run_id
    }

    fn end_run(&self, id: &BuildTaskId) {
        let run = self
            .runs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        if let Some(run) = run {
            run.cancel.cancel();
        }
    }

    fn is_current_run(&self, id: &BuildTaskId, run: RunId) -> bool {
        let runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        runs.get(id).is_some_and(|active| active.id == run)
    }

    fn emit(&self, event: &BuildEvent) {
        for sub in &self.subscribers {
            sub.on_event(event);
        }
    }

    /// Write `task` moved to `to` and publish the event. Caller holds the task lock.
    async fn commit(
        &self,
        task: &mut BuildTask,
        to: BuildTaskStatus,
        note: String,
        deadline: Option<SystemTime>,
    ) -> Result<(), CoreError> {
        let now = self.clock.now();
        let from = task.status;
        let running_ms = (from == BuildTaskStatus::Running && to != BuildTaskStatus::Running)
            .then(|| now.duration_since(task.updated).unwrap_or_default().as_millis() as u64);

        let mut next = task.clone();
        next.status = to;
        next.deadline = if to.is_terminal() { None } else { deadline };
        next.last_activity = note;
        next.updated = now;
        self.store.update(next.clone()).await?;
        *task = next;

        self.emit(&BuildEvent {
            task_id: task.id.clone(),
            workspace_id: task.workspace_id.clone(),
            from: Some(from),
            to,
            note: task.last_activity.clone(),
            at: now,
            running_ms,
        });
        if to.is_terminal() {
            self.end_run(&task.id);
            self.wakeup.notify_one();
        }
        if to == BuildTaskStatus::Succeeded {
            self.retries
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&task.id);
        }
        self.changed.notify_waiters();
        Ok(())
    }

    /// Find a reusable task for the request or create a new one.
    ///
    /// `Pending`, `Running` and `Succeeded` tasks with the same fingerprint are reused. A
    /// `Failed` or `TimedOut` task is re-queued while `policy` allows it.
    #[instrument(level = "debug", skip(self, req, policy), fields(workspace = %req.workspace_id, package = %req.package_id))]
    pub async fn request(
        &self,
        req: BuildRequest,
        policy: &RetryPolicy,
    ) -> Result<BuildTicket, CoreError> {
        let fp = fingerprint(&req.package_id, &req.spec);
        let key = (req.workspace_id.clone(), fp.clone());
        let _guard = self.fingerprint_locks.lock(&key).await;

        if let Some(existing) = self.store.find_by_fingerprint(&req.workspace_id, &fp).await? {
            if existing.status.is_retryable() {
                return self.retry(&existing.id, policy).await;
            }
            debug!(task = %existing.id, status = %existing.status, "reusing build task");
            return Ok(BuildTicket {
                task: existing,
                reused: true,
            });
        }

        let now = self.clock.now();
        let task = BuildTask {
            id: BuildTaskId::new(Uuid::new_v4().to_string()),
            workspace_id: req.workspace_id,
            package_id: req.package_id,
            class: req.spec.class,
            spec: req.spec.content,
            fingerprint: fp,
            registry_id: req.registry_id,
            status: BuildTaskStatus::Pending,
            deadline: Some(now + self.config.queue_wait()),
            last_activity: NOTE_QUEUED.to_string(),
            created: now,
            updated: now,
        };
        self.store.insert(task.clone()).await?;
        info!(task = %task.id, fingerprint = %task.fingerprint, "build task created");

        self.emit(&BuildEvent {
            task_id: task.id.clone(),
            workspace_id: task.workspace_id.clone(),
            from: None,
            to: BuildTaskStatus::Pending,
            note: task.last_activity.clone(),
            at: now,
            running_ms: None,
        });
        self.changed.notify_waiters();
        self.wake();

        Ok(BuildTicket {
            task,
            reused: false,
        })
    }

    async fn retry(&self, id: &BuildTaskId, policy: &RetryPolicy) -> Result<BuildTicket, CoreError> {
        let _guard = self.task_locks.lock(id).await;
        let mut task = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if !task.status.is_retryable() {
            return Ok(BuildTicket { task, reused: true });
        }

        let used = self.retries_of(id);
        if used >= policy.max_retries {
            if task.status != BuildTaskStatus::Failed || task.last_activity != NOTE_RETRY_EXHAUSTED {
                self.commit(
                    &mut task,
                    BuildTaskStatus::Failed,
                    NOTE_RETRY_EXHAUSTED.to_string(),
                    None,
                )
                .await?;
            }
            warn!(task = %id, retries = used, "build task exhausted its retry budget");
            return Err(CoreError::RetryExhausted(id.clone()));
        }

        self.retries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), used + 1);

        let deadline = self.clock.now() + self.config.queue_wait();
        let note = format!("retry {}/{} after {}", used + 1, policy.max_retries, task.status);
        self.commit(&mut task, BuildTaskStatus::Pending, note, Some(deadline))
            .await?;
        info!(task = %id, attempt = used + 1, "build task re-queued");
        self.wake();

        Ok(BuildTicket {
            task,
            reused: false,
        })
    }

    /// Apply a transition to the task `id`.
    pub async fn apply(
        &self,
        id: &BuildTaskId,
        transition: Transition,
    ) -> Result<TransitionOutcome, CoreError> {
        self.apply_checked(id, None, transition).await
    }

    /// Apply a transition reported by the run `run` of task `id`.
    ///
    /// Discarded unless `run` is still the task's in-flight run.
    pub async fn apply_for_run(
        &self,
        id: &BuildTaskId,
        run: RunId,
        transition: Transition,
    ) -> Result<TransitionOutcome, CoreError> {
        self.apply_checked(id, Some(run), transition).await
    }

    async fn apply_checked(
        &self,
        id: &BuildTaskId,
        run: Option<RunId>,
        transition: Transition,
    ) -> Result<TransitionOutcome, CoreError> {
        let _guard = self.task_locks.lock(id).await;
        let mut task = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if task.status.is_terminal() {
            debug!(task = %id, status = %task.status, to = %transition.target(), "transition on terminal task discarded");
            return Ok(TransitionOutcome::Discarded(task));
        }
        if let Some(run) = run.filter(|run| !self.is_current_run(id, *run)) {
            debug!(task = %id, %run, status = %task.status, to = %transition.target(), "report of a superseded run discarded");
            return Ok(TransitionOutcome::Discarded(task));
        }
        if !transition.allowed_from(task.status) {
            return Err(CoreError::IllegalTransition {
                id: id.clone(),
                from: task.status,
                to: transition.target(),
            });
        }

        let now = self.clock.now();
        match transition {
            Transition::Start => {
                let deadline = now + self.config.build_time();
                self.commit(
                    &mut task,
                    BuildTaskStatus::Running,
                    NOTE_STARTED.to_string(),
                    Some(deadline),
                )
                .await?;
                let run = self.open_run(id);
                debug!(task = %id, %run, "run opened");
            }
            Transition::Succeed(artifact) => {
                let note = format!("{NOTE_SUCCEEDED}: {}", artifact.image);
                self.artifacts
                    .record(artifact)
                    .await
                    .map_err(CoreError::Artifacts)?;
                self.commit(&mut task, BuildTaskStatus::Succeeded, note, None)
                    .await?;
            }
            Transition::Fail(note) => {
                self.commit(&mut task, BuildTaskStatus::Failed, note, None)
                    .await?;
            }
            Transition::TimeOut(note) => {
                if !task.is_overdue(now) {
                    return Ok(TransitionOutcome::Discarded(task));
                }
                // abandon the in-flight run before the terminal commit
                self.end_run(id);
                self.commit(&mut task, BuildTaskStatus::TimedOut, note, None)
                    .await?;
            }
        }

        Ok(TransitionOutcome::Applied(task))
    }

    /// Move the oldest `Pending` tasks to `Running` while below capacity.
    pub async fn promote(&self) -> Result<Vec<BuildTask>, CoreError> {
        let _guard = self.promote_lock.lock().await;

        let running = self.store.list_by_status(BuildTaskStatus::Running).await?.len();
        let free = self.config.capacity.saturating_sub(running);
        if free == 0 {
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let pending = self.store.list_by_status(BuildTaskStatus::Pending).await?;
        let mut promoted = Vec::new();
        for task in pending.into_iter().filter(|t| !t.is_overdue(now)) {
            if promoted.len() == free {
                break;
            }
            match self.apply(&task.id, Transition::Start).await {
                Ok(TransitionOutcome::Applied(t)) => promoted.push(t),
                Ok(TransitionOutcome::Discarded(_)) | Err(CoreError::IllegalTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        if !promoted.is_empty() {
            debug!(count = promoted.len(), running, "build tasks promoted");
        }
        Ok(promoted)
    }

    /// Commit `TimedOut` for every `Pending` or `Running` task past its deadline.
    pub async fn sweep_overdue(&self) -> Result<Vec<BuildTask>, CoreError> {
        let now = self.clock.now();
        let mut timed_out = Vec::new();

        for status in [BuildTaskStatus::Pending, BuildTaskStatus::Running] {
            let overdue: Vec<BuildTask> = self
                .store
                .list_by_status(status)
                .await?
                .into_iter()
                .filter(|t| t.is_overdue(now))
                .collect();

            for task in overdue {
                let note = format!("deadline exceeded while {status}");
                if let TransitionOutcome::Applied(t) =
                    self.apply(&task.id, Transition::TimeOut(note)).await?
                {
                    warn!(task = %t.id, was = %status, "build task timed out");
                    timed_out.push(t);
                }
            }
        }
        Ok(timed_out)
    }

    /// Fail every `Running` task; their runs were lost with the previous process.
    pub async fn recover(&self) -> Result<usize, CoreError> {
        let running = self.store.list_by_status(BuildTaskStatus::Running).await?;
        let mut recovered = 0;
        for task in running {
            let outcome = self
                .apply(&task.id, Transition::Fail(NOTE_INTERRUPTED.to_string()))
                .await?;
            if outcome.is_applied() {
                recovered += 1;
            }
        }
        if recovered > 0 {
            info!(recovered, "interrupted build tasks marked failed");
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::AtomicBool,
        time::Duration,
    };

    use async_trait::async_trait;
    use kiln_model::ArtifactRef;

    use super::*;
    use crate::{clock::ManualClock, memory::MemoryCatalog, state::MemoryTaskStore};

    /// Task store that loses the first write of a `Succeeded` row.
    #[derive(Default)]
    struct LossySuccessStore {
        inner: MemoryTaskStore,
        lost: AtomicBool,
    }

    #[async_trait]
    impl BuildTaskStore for LossySuccessStore {
        async fn insert(&self, task: BuildTask) -> Result<(), StoreError> {
            self.inner.insert(task).await
        }

        async fn get(&self, id: &BuildTaskId) -> Result<Option<BuildTask>, StoreError> {
            self.inner.get(id).await
        }

        async fn update(&self, task: BuildTask) -> Result<(), StoreError> {
            if task.status == BuildTaskStatus::Succeeded && !self.lost.swap(true, Ordering::SeqCst) {
                return Err(StoreError::Backend("write lost".into()));
            }
            self.inner.update(task).await
        }

        async fn find_by_fingerprint(
            &self,
            workspace: &WorkspaceId,
            fingerprint: &str,
        ) -> Result<Option<BuildTask>, StoreError> {
            self.inner.find_by_fingerprint(workspace, fingerprint).await
        }

        async fn list_by_status(&self, status: BuildTaskStatus) -> Result<Vec<BuildTask>, StoreError> {
            self.inner.list_by_status(status).await
        }

        async fn query(&self, q: &BuildTaskQuery) -> Result<BuildTaskPage<BuildTask>, StoreError> {
            self.inner.query(q).await
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<BuildEvent>>,
    }

    impl BuildSubscriber for Recorder {
        fn on_event(&self, event: &BuildEvent) {
            self.events.lock().unwrap().push(event.clone());
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    struct Fixture {
        machine: BuildMachine,
        clock: Arc<ManualClock>,
        catalog: MemoryCatalog,
        recorder: Arc<Recorder>,
    }

    fn fixture(config: BuildConfig) -> Fixture {
        fixture_with_store(config, Arc::new(MemoryTaskStore::new()))
    }

    fn fixture_with_store(config: BuildConfig, store: Arc<dyn BuildTaskStore>) -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let catalog = MemoryCatalog::new();
        let recorder = Arc::new(Recorder::default());
        let machine = BuildMachine::new(
            store,
            Arc::new(catalog.clone()),
            clock.clone(),
            config,
        )
        .with_subscriber(recorder.clone());
        Fixture {
            machine,
            clock,
            catalog,
            recorder,
        }
    }

    fn request(content: &str) -> BuildRequest {
        BuildRequest {
            workspace_id: WorkspaceId::from("ws"),
            package_id: PackageId::from("pkg"),
            registry_id: RegistryId::from("reg"),
            spec: BuildSpec {
                class: "python-pip".into(),
                content: content.into(),
            },
        }
    }

    fn artifact(task: &BuildTask) -> PackageArtifact {
        PackageArtifact {
            package_id: task.package_id.clone(),
            workspace_id: task.workspace_id.clone(),
            image: ArtifactRef {
                registry: "registry.local".into(),
                repository: "ws/pkg".into(),
                tag: "fp-abc".into(),
            },
            build_task_id: task.id.clone(),
        }
    }

    #[tokio::test]
    async fn new_task_is_pending_with_queue_deadline() {
        let f = fixture(BuildConfig::default());
        let ticket = f.machine.request(request("A"), &RetryPolicy::default()).await.unwrap();

        assert!(!ticket.reused);
        assert_eq!(ticket.task.status, BuildTaskStatus::Pending);
        assert_eq!(
            ticket.task.deadline,
            Some(f.clock.now() + BuildConfig::default().queue_wait())
        );
    }

    #[tokio::test]
    async fn same_fingerprint_is_reused() {
        let f = fixture(BuildConfig::default());
        let a = f.machine.request(request("A"), &RetryPolicy::default()).await.unwrap();
        let b = f.machine.request(request("A"), &RetryPolicy::default()).await.unwrap();
        let c = f.machine.request(request("B"), &RetryPolicy::default()).await.unwrap();

        assert!(b.reused);
        assert_eq!(a.task.id, b.task.id);
        assert_ne!(a.task.id, c.task.id);
    }

    #[tokio::test]
    async fn happy_path_clears_deadline_and_records_artifact() {
        let f = fixture(BuildConfig::default());
        let id = f
            .machine
            .request(request("A"), &RetryPolicy::default())
            .await
            .unwrap()
            .task
            .id;

        let promoted = f.machine.promote().await.unwrap();
        assert_eq!(promoted.len(), 1);
        assert_eq!(promoted[0].status, BuildTaskStatus::Running);
        assert!(promoted[0].deadline.is_some());
        assert!(f.machine.run_token(&id).is_some());

        f.clock.advance(Duration::from_secs(3));
        let out = f
            .machine
            .apply(&id, Transition::Succeed(artifact(&promoted[0])))
            .await
            .unwrap();
        let task = out.task();
        assert!(out.is_applied());
        assert_eq!(task.status, BuildTaskStatus::Succeeded);
        assert!(task.deadline.is_none());
        assert_eq!(f.catalog.artifact_count(), 1);
        assert!(f.machine.run_token(&id).is_none());

        let events = f.recorder.events.lock().unwrap();
        let path: Vec<_> = events.iter().map(|e| e.to).collect();
        assert_eq!(
            path,
            vec![
                BuildTaskStatus::Pending,
                BuildTaskStatus::Running,
                BuildTaskStatus::Succeeded
            ]
        );
        assert_eq!(events[2].running_ms, Some(3_000));
    }

    #[tokio::test]
    async fn pending_cannot_succeed() {
        let f = fixture(BuildConfig::default());
        let task = f
            .machine
            .request(request("A"), &RetryPolicy::default())
            .await
            .unwrap()
            .task;
        let err = f
            .machine
            .apply(&task.id, Transition::Succeed(artifact(&task)))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn swept_running_task_times_out_and_late_report_is_discarded() {
        let f = fixture(BuildConfig::default());
        let id = f
            .machine
            .request(request("A"), &RetryPolicy::default())
            .await
            .unwrap()
            .task
            .id;
        let running = f.machine.promote().await.unwrap().remove(0);
        let token = f.machine.run_token(&id).unwrap();

        f.clock.advance(BuildConfig::default().build_time() + Duration::from_secs(1));
        let swept = f.machine.sweep_overdue().await.unwrap();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].status, BuildTaskStatus::TimedOut);
        assert!(swept[0].deadline.is_none());
        assert!(token.is_cancelled());

        let late = f
            .machine
            .apply(&id, Transition::Succeed(artifact(&running)))
            .await
            .unwrap();
        assert!(!late.is_applied());
        assert_eq!(late.task().status, BuildTaskStatus::TimedOut);
        assert_eq!(f.catalog.artifact_count(), 0);
    }

    #[tokio::test]
    async fn report_of_superseded_run_is_discarded() {
        let f = fixture(BuildConfig::default());
        let policy = RetryPolicy::default();
        let id = f.machine.request(request("A"), &policy).await.unwrap().task.id;
        let first = f.machine.promote().await.unwrap().remove(0);
        let stale = f.machine.active_run(&id).unwrap();

        f.clock.advance(BuildConfig::default().build_time() + Duration::from_secs(1));
        assert_eq!(f.machine.sweep_overdue().await.unwrap().len(), 1);
        assert!(stale.cancel.is_cancelled());

        let requeued = f.machine.request(request("A"), &policy).await.unwrap();
        assert_eq!(requeued.task.status, BuildTaskStatus::Pending);

        let early = f
            .machine
            .apply_for_run(&id, stale.id, Transition::Fail("late failure".into()))
            .await
            .unwrap();
        assert!(!early.is_applied());
        assert_eq!(early.task().status, BuildTaskStatus::Pending);

        f.machine.promote().await.unwrap();
        let current = f.machine.active_run(&id).unwrap();
        assert_ne!(current.id, stale.id);

        let late = f
            .machine
            .apply_for_run(&id, stale.id, Transition::Succeed(artifact(&first)))
            .await
            .unwrap();
        assert!(!late.is_applied());
        assert_eq!(late.task().status, BuildTaskStatus::Running);
        assert_eq!(f.catalog.artifact_count(), 0);
        assert!(!current.cancel.is_cancelled());

        let done = f
            .machine
            .apply_for_run(&id, current.id, Transition::Succeed(artifact(&first)))
            .await
            .unwrap();
        assert!(done.is_applied());
        assert_eq!(done.task().status, BuildTaskStatus::Succeeded);
    }

    #[tokio::test]
    async fn lost_success_commit_leaves_task_retryable() {
        let f = fixture_with_store(
            BuildConfig::default(),
            Arc::new(LossySuccessStore::default()),
        );
        let policy = RetryPolicy::default();
        let id = f.machine.request(request("A"), &policy).await.unwrap().task.id;
        let running = f.machine.promote().await.unwrap().remove(0);
        let run = f.machine.active_run(&id).unwrap();

        let err = f
            .machine
            .apply_for_run(&id, run.id, Transition::Succeed(artifact(&running)))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Store(StoreError::Backend(_))));
        let failed = f
            .machine
            .apply_for_run(&id, run.id, Transition::Fail("commit failed".into()))
            .await
            .unwrap();
        assert!(failed.is_applied());

        let requeued = f.machine.request(request("A"), &policy).await.unwrap();
        assert_eq!(requeued.task.id, id);
        let running = f.machine.promote().await.unwrap().remove(0);
        let run = f.machine.active_run(&id).unwrap();

        let done = f
            .machine
            .apply_for_run(&id, run.id, Transition::Succeed(artifact(&running)))
            .await
            .unwrap();
        assert!(done.is_applied());
        assert_eq!(done.task().status, BuildTaskStatus::Succeeded);
        assert_eq!(f.catalog.artifact_count(), 1);
    }

    #[tokio::test]
    async fn success_clears_retry_ledger() {
        let f = fixture(BuildConfig::default());
        let policy = RetryPolicy::default();
        let id = f.machine.request(request("A"), &policy).await.unwrap().task.id;
        f.machine.apply(&id, Transition::Fail("boom".into())).await.unwrap();
        f.machine.request(request("A"), &policy).await.unwrap();
        assert_eq!(f.machine.retries_of(&id), 1);

        let running = f.machine.promote().await.unwrap().remove(0);
        f.machine
            .apply(&id, Transition::Succeed(artifact(&running)))
            .await
            .unwrap();
        assert_eq!(f.machine.retries_of(&id), 0);
        assert!(f.machine.retries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deadline_is_strict() {
        let f = fixture(BuildConfig::default());
        f.machine.request(request("A"), &RetryPolicy::default()).await.unwrap();

        f.clock.advance(BuildConfig::default().queue_wait());
        assert!(f.machine.sweep_overdue().await.unwrap().is_empty());

        f.clock.advance(Duration::from_millis(1));
        assert_eq!(f.machine.sweep_overdue().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn promotion_respects_capacity_and_age() {
        let f = fixture(BuildConfig {
            capacity: 2,
            ..Default::default()
        });
        let mut ids = Vec::new();
        for content in ["A", "B", "C"] {
            let t = f.machine.request(request(content), &RetryPolicy::default()).await.unwrap();
            ids.push(t.task.id);
            f.clock.advance(Duration::from_secs(1));
        }

        let first: Vec<_> = f.machine.promote().await.unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(first, ids[..2].to_vec());
        assert!(f.machine.promote().await.unwrap().is_empty());

        f.machine
            .apply(&ids[0], Transition::Fail("boom".into()))
            .await
            .unwrap();
        let next: Vec<_> = f.machine.promote().await.unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(next, vec![ids[2].clone()]);
    }

    #[tokio::test]
    async fn failed_task_is_retried_until_budget_is_spent() {
        let f = fixture(BuildConfig::default());
        let policy = RetryPolicy { max_retries: 1 };
        let id = f.machine.request(request("A"), &policy).await.unwrap().task.id;
        f.machine.apply(&id, Transition::Fail("boom".into())).await.unwrap();

        let again = f.machine.request(request("A"), &policy).await.unwrap();
        assert_eq!(again.task.id, id);
        assert!(!again.reused);
        assert_eq!(again.task.status, BuildTaskStatus::Pending);
        assert!(again.task.deadline.is_some());
        assert_eq!(f.machine.retries_of(&id), 1);

        f.machine.apply(&id, Transition::Fail("boom".into())).await.unwrap();
        let err = f.machine.request(request("A"), &policy).await.unwrap_err();
        assert!(matches!(err, CoreError::RetryExhausted(_)));
        assert_eq!(err.code(), kiln_model::ErrorCode::InvalidPackage);

        let task = f.machine.get(&id).await.unwrap().unwrap();
        assert_eq!(task.status, BuildTaskStatus::Failed);
        assert_eq!(task.last_activity, NOTE_RETRY_EXHAUSTED);
    }

    #[tokio::test]
    async fn recover_fails_running_tasks() {
        let f = fixture(BuildConfig::default());
        f.machine.request(request("A"), &RetryPolicy::default()).await.unwrap();
        f.machine.request(request("B"), &RetryPolicy::default()).await.unwrap();
        f.machine.promote().await.unwrap();

        assert_eq!(f.machine.recover().await.unwrap(), 2);
        let failed = f
            .machine
            .query(&BuildTaskQuery::new().with_status(BuildTaskStatus::Failed))
            .await
            .unwrap();
        assert_eq!(failed.total, 2);
        assert!(failed.items.iter().all(|t| t.last_activity == NOTE_INTERRUPTED));
    }

    #[tokio::test]
    async fn concurrent_terminal_writers_first_wins() {
        let f = Arc::new(fixture(BuildConfig::default()));
        let id = f
            .machine
            .request(request("A"), &RetryPolicy::default())
            .await
            .unwrap()
            .task
            .id;
        f.machine.promote().await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let f = Arc::clone(&f);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                f.machine
                    .apply(&id, Transition::Fail(format!("writer {i}")))
                    .await
                    .unwrap()
                    .is_applied()
            }));
        }
        let mut applied = 0;
        for h in handles {
            if h.await.unwrap() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
    }
}

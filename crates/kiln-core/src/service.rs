//! Service layer and engine wiring.

use std::sync::Arc;

use kiln_model::{
    BuildTask, BuildTaskId, BuildTaskPage, BuildTaskQuery, JobRunManifest, JobSubmission,
    PackageArtifact, PackageId, PackageInfo, WorkspaceId,
};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::{
    clock::{Clock, SystemClock},
    config::BuildConfig,
    error::{CoreError, ResolveError},
    machine::{BuildMachine, BuildRequest, BuildRunner, BuildTicket, Sweeper},
    memory::MemoryCatalog,
    ports::{
        ArtifactStore, ClusterCatalog, ClusterScheduler, CredentialStore, EnvironmentCatalog,
        ImageBuilder, ImagePusher, LabelCatalog, PackageCatalog, PortError,
    },
    publish::RegistryPublisher,
    resolve::{JobManifestResolver, WaitOptions},
    spec::ClassRouter,
    state::{BuildTaskStore, MemoryTaskStore, StoreError},
    subscriber::BuildSubscriber,
};

/// Package build requests and build task reads.
#[derive(Clone)]
pub struct BuildService {
    machine: Arc<BuildMachine>,
    classes: Arc<ClassRouter>,
    packages: Arc<dyn PackageCatalog>,
    publisher: Arc<RegistryPublisher>,
}

impl BuildService {
    pub fn new(
        machine: Arc<BuildMachine>,
        classes: Arc<ClassRouter>,
        packages: Arc<dyn PackageCatalog>,
        publisher: Arc<RegistryPublisher>,
    ) -> Self {
        Self {
            machine,
            classes,
            packages,
            publisher,
        }
    }

    pub async fn package(
        &self,
        workspace: &WorkspaceId,
        id: &PackageId,
    ) -> Result<PackageInfo, ResolveError> {
        if workspace.is_blank() {
            return Err(ResolveError::InvalidWorkspace);
        }
        self.packages
            .package(workspace, id)
            .await?
            .ok_or_else(|| ResolveError::UnknownPackage(id.clone()))
    }

    /// Render the package's build spec and find or create its build task.
    ///
    /// The registry and a push credential are checked first so that configuration errors surface
    /// to the caller instead of failing the build later.
    #[instrument(level = "debug", skip(self, package), fields(workspace = %package.workspace_id, package = %package.id))]
    pub async fn request_build(&self, package: &PackageInfo) -> Result<BuildTicket, ResolveError> {
        self.publisher
            .preflight(&package.registry_id, &package.workspace_id)
            .await?;

        let spec = self
            .classes
            .generate(&package.class, &package.inputs)
            .map_err(CoreError::from)?;

        let req = BuildRequest {
            workspace_id: package.workspace_id.clone(),
            package_id: package.id.clone(),
            registry_id: package.registry_id.clone(),
            spec,
        };
        let policy = self.machine.config().retry;
        Ok(self.machine.request(req, &policy).await?)
    }

    pub async fn request_package_build(
        &self,
        workspace: &WorkspaceId,
        id: &PackageId,
    ) -> Result<BuildTicket, ResolveError> {
        let package = self.package(workspace, id).await?;
        self.request_build(&package).await
    }

    /// Task `id` if it belongs to `workspace`.
    pub async fn get(
        &self,
        workspace: &WorkspaceId,
        id: &BuildTaskId,
    ) -> Result<Option<BuildTask>, CoreError> {
        Ok(self
            .machine
            .get(id)
            .await?
            .filter(|t| &t.workspace_id == workspace))
    }

    pub async fn list(&self, q: &BuildTaskQuery) -> Result<BuildTaskPage<BuildTask>, CoreError> {
        self.machine.query(q).await
    }

    /// Wait until task `id` is terminal.
    pub async fn wait(&self, id: &BuildTaskId, opts: &WaitOptions) -> Result<BuildTask, ResolveError> {
        let started = Instant::now();
        let deadline = started + opts.timeout;
        let poll = self.machine.config().wait_poll();

        loop {
            let notified = self.machine.changes().notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let task = self
                .machine
                .get(id)
                .await?
                .ok_or_else(|| CoreError::Store(StoreError::NotFound(id.clone())))?;
            if task.status.is_terminal() {
                return Ok(task);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ResolveError::WaitTimeout {
                    task: id.clone(),
                    waited_ms: now.duration_since(started).as_millis() as u64,
                });
            }

            tokio::select! {
                _ = opts.cancel.cancelled() => return Err(ResolveError::Cancelled(id.clone())),
                _ = &mut notified => {}
                _ = tokio::time::sleep(poll.min(deadline - now)) => {}
            }
        }
    }

    /// Artifact recorded by the `Succeeded` commit of `task`.
    pub async fn artifact(&self, task: &BuildTask) -> Result<PackageArtifact, ResolveError> {
        self.machine
            .artifacts()
            .artifact_for_task(&task.id)
            .await
            .map_err(CoreError::Artifacts)?
            .ok_or_else(|| {
                ResolveError::Core(CoreError::Artifacts(PortError::new(format!(
                    "no artifact recorded for build task {}",
                    task.id
                ))))
            })
    }
}

/// Resolves submissions and hands them to the cluster scheduler.
#[derive(Clone)]
pub struct JobService {
    resolver: Arc<JobManifestResolver>,
    scheduler: Arc<dyn ClusterScheduler>,
}

impl JobService {
    pub fn new(resolver: Arc<JobManifestResolver>, scheduler: Arc<dyn ClusterScheduler>) -> Self {
        Self {
            resolver,
            scheduler,
        }
    }

    pub fn resolver(&self) -> &Arc<JobManifestResolver> {
        &self.resolver
    }

    /// The scheduler only ever sees fully resolved manifests.
    #[instrument(level = "info", skip(self, sub, opts), fields(workspace = %sub.workspace_id, package = %sub.package_id))]
    pub async fn submit(
        &self,
        sub: &JobSubmission,
        opts: &WaitOptions,
    ) -> Result<Arc<JobRunManifest>, ResolveError> {
        let manifest = match self.resolver.resolve(sub, opts).await {
            Ok(m) => Arc::new(m),
            Err(e) => {
                warn!(code = %e.code(), error = %e, "job submission rejected");
                return Err(e);
            }
        };

        self.scheduler
            .accept(Arc::clone(&manifest))
            .await
            .map_err(ResolveError::Scheduler)?;
        info!(build_task = %manifest.build_task_id, "job handed to scheduler");
        Ok(manifest)
    }
}

/// External collaborators of the engine.
#[derive(Clone)]
pub struct Ports {
    pub store: Arc<dyn BuildTaskStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub environments: Arc<dyn EnvironmentCatalog>,
    pub labels: Arc<dyn LabelCatalog>,
    pub packages: Arc<dyn PackageCatalog>,
    pub clusters: Arc<dyn ClusterCatalog>,
    pub builder: Arc<dyn ImageBuilder>,
    pub pusher: Arc<dyn ImagePusher>,
    pub scheduler: Arc<dyn ClusterScheduler>,
}

impl Ports {
    /// Every catalog served by one [`MemoryCatalog`].
    pub fn in_memory(
        catalog: MemoryCatalog,
        builder: Arc<dyn ImageBuilder>,
        pusher: Arc<dyn ImagePusher>,
        scheduler: Arc<dyn ClusterScheduler>,
    ) -> Self {
        let catalog = Arc::new(catalog);
        Self {
            store: Arc::new(MemoryTaskStore::new()),
            artifacts: catalog.clone(),
            credentials: catalog.clone(),
            environments: catalog.clone(),
            labels: catalog.clone(),
            packages: catalog.clone(),
            clusters: catalog,
            builder,
            pusher,
            scheduler,
        }
    }
}

pub struct EngineBuilder {
    ports: Ports,
    config: BuildConfig,
    classes: ClassRouter,
    clock: Arc<dyn Clock>,
    subscribers: Vec<Arc<dyn BuildSubscriber>>,
}

impl EngineBuilder {
    pub fn config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }

    pub fn classes(mut self, classes: ClassRouter) -> Self {
        self.classes = classes;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn subscriber(mut self, subscriber: Arc<dyn BuildSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn build(self) -> Result<Engine, CoreError> {
        self.config.validate()?;
        let Ports {
            store,
            artifacts,
            credentials,
            environments,
            labels,
            packages,
            clusters,
            builder,
            pusher,
            scheduler,
        } = self.ports;

        let mut machine = BuildMachine::new(store, artifacts, self.clock.clone(), self.config.clone());
        for sub in self.subscribers {
            machine = machine.with_subscriber(sub);
        }
        let machine = Arc::new(machine);

        let publisher = Arc::new(RegistryPublisher::new(
            credentials,
            pusher,
            self.clock,
            &self.config,
        ));
        let runner = Arc::new(BuildRunner::new(machine.clone(), builder, publisher.clone()));
        let sweeper = Arc::new(Sweeper::new(machine.clone(), runner));

        debug!(classes = ?self.classes.names(), "build classes loaded");
        let builds = BuildService::new(machine.clone(), Arc::new(self.classes), packages, publisher);
        let resolver = Arc::new(JobManifestResolver::new(
            builds.clone(),
            labels,
            environments,
            clusters,
            &self.config,
        ));
        let jobs = JobService::new(resolver, scheduler);

        Ok(Engine {
            machine,
            builds,
            jobs,
            sweeper,
        })
    }
}

/// Fully wired engine.
#[derive(Clone)]
pub struct Engine {
    pub machine: Arc<BuildMachine>,
    pub builds: BuildService,
    pub jobs: JobService,
    pub sweeper: Arc<Sweeper>,
}

impl Engine {
    pub fn builder(ports: Ports) -> EngineBuilder {
        EngineBuilder {
            ports,
            config: BuildConfig::default(),
            classes: ClassRouter::with_builtins(),
            clock: Arc::new(SystemClock),
            subscribers: Vec::new(),
        }
    }

    /// Fail tasks left `Running` by a previous process.
    pub async fn recover(&self) -> Result<usize, CoreError> {
        self.machine.recover().await
    }
}

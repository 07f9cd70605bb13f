use std::{fmt, future::Future, sync::Arc};

use kiln_model::{BuildSpec, BuildTask, PackageArtifact};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{BuildMachine, Transition, TransitionOutcome};
use crate::{
    config::BackoffStrategy,
    ports::{BuildError, ImageBuilder},
    publish::{PublishError, PublishTarget, RegistryPublisher},
};

/// How a failed stage attempt is handled.
enum Failure {
    Transient,
    Fatal,
    Cancelled,
}

trait StageError: fmt::Display {
    fn failure(&self) -> Failure;
}

impl StageError for BuildError {
    fn failure(&self) -> Failure {
        match self {
            BuildError::Transient(_) => Failure::Transient,
            BuildError::Failed(_) => Failure::Fatal,
            BuildError::Cancelled => Failure::Cancelled,
        }
    }
}

impl StageError for PublishError {
    fn failure(&self) -> Failure {
        match self {
            PublishError::Transient(_) => Failure::Transient,
            PublishError::Cancelled => Failure::Cancelled,
            _ => Failure::Fatal,
        }
    }
}

enum RunError {
    /// The run was abandoned; whoever cancelled it commits the outcome.
    Cancelled,
    Failed(String),
}

/// Executes a `Running` task: image build, then registry publish.
///
/// Transient errors are retried per stage with backoff; the terminal transition is committed
/// only after both stages have finished or given up.
pub struct BuildRunner {
    machine: Arc<BuildMachine>,
    builder: Arc<dyn ImageBuilder>,
    publisher: Arc<RegistryPublisher>,
    attempts: u32,
    backoff: BackoffStrategy,
}

impl BuildRunner {
    pub fn new(
        machine: Arc<BuildMachine>,
        builder: Arc<dyn ImageBuilder>,
        publisher: Arc<RegistryPublisher>,
    ) -> Self {
        let attempts = machine.config().transient_attempts.max(1);
        let backoff = machine.config().backoff;
        Self {
            machine,
            builder,
            publisher,
            attempts,
            backoff,
        }
    }

    pub fn publisher(&self) -> &Arc<RegistryPublisher> {
        &self.publisher
    }

    /// Run a task promoted to `Running` to its terminal state.
    pub async fn run(&self, task: BuildTask) {
        let Some(run) = self.machine.active_run(&task.id) else {
            debug!(task = %task.id, "no active run; skipping");
            return;
        };

        let transition = match self.execute(&task, &run.cancel).await {
            Ok(artifact) => Transition::Succeed(artifact),
            Err(RunError::Failed(note)) => Transition::Fail(note),
            Err(RunError::Cancelled) => {
                debug!(task = %task.id, "run abandoned");
                return;
            }
        };

        match self.machine.apply_for_run(&task.id, run.id, transition).await {
            Ok(TransitionOutcome::Applied(t)) => {
                info!(task = %t.id, status = %t.status, activity = %t.last_activity, "build finished")
            }
            Ok(TransitionOutcome::Discarded(t)) => {
                debug!(task = %t.id, status = %t.status, "late build report discarded")
            }
            Err(e) => {
                error!(task = %task.id, error = %e, "failed to commit build result");
                // the artifact could not be recorded; make the task retryable
                if let Err(e) = self
                    .machine
                    .apply_for_run(&task.id, run.id, Transition::Fail(format!("commit failed: {e}")))
                    .await
                {
                    error!(task = %task.id, error = %e, "failed to mark build task failed");
                }
            }
        }
    }

    async fn execute(
        &self,
        task: &BuildTask,
        cancel: &CancellationToken,
    ) -> Result<PackageArtifact, RunError> {
        let spec = BuildSpec {
            class: task.class.clone(),
            content: task.spec.clone(),
        };
        let output = self
            .attempt("build", cancel, || {
                self.builder.build(task, &spec, cancel.clone())
            })
            .await?;

        let target = PublishTarget {
            workspace_id: task.workspace_id.clone(),
            package_id: task.package_id.clone(),
            registry_id: task.registry_id.clone(),
            fingerprint: task.fingerprint.clone(),
        };
        let image = self
            .attempt("publish", cancel, || {
                self.publisher.publish(&output, &target, cancel.clone())
            })
            .await?;

        Ok(PackageArtifact {
            package_id: task.package_id.clone(),
            workspace_id: task.workspace_id.clone(),
            image,
            build_task_id: task.id.clone(),
        })
    }

    async fn attempt<T, E, F, Fut>(
        &self,
        stage: &'static str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RunError>
    where
        E: StageError,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            let res = tokio::select! {
                _ = cancel.cancelled() => return Err(RunError::Cancelled),
                r = op() => r,
            };
            let err = match res {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };

            match err.failure() {
                Failure::Cancelled => return Err(RunError::Cancelled),
                Failure::Fatal => return Err(RunError::Failed(format!("{stage}: {err}"))),
                Failure::Transient if attempt >= self.attempts => {
                    return Err(RunError::Failed(format!(
                        "{stage} failed after {attempt} attempts: {err}"
                    )));
                }
                Failure::Transient => {
                    let delay = self.backoff.delay(attempt);
                    warn!(stage, attempt, delay_ms = delay.as_millis() as u64, error = %err, "transient failure; retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(RunError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}

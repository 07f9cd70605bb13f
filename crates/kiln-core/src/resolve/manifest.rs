use std::{sync::Arc, time::Duration};

use kiln_model::{BuildTaskStatus, JobRunManifest, JobSubmission};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::{plan_array, resolve_environment, resolve_git_repo, resolve_labels, validate_resources};
use crate::{
    config::BuildConfig,
    error::ResolveError,
    ports::{ClusterCatalog, EnvironmentCatalog, LabelCatalog},
    service::BuildService,
};

/// Bounds of the wait for a package build.
///
/// Giving up the wait never cancels the build itself.
#[derive(Debug, Clone)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl WaitOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self::new(Duration::from_secs(60 * 60))
    }
}

/// Arguments are passed verbatim to the job; NUL bytes cannot be.
pub fn validate_arguments(args: &[String], max: usize) -> Result<(), ResolveError> {
    if args.len() > max {
        return Err(ResolveError::InvalidArguments(format!(
            "{} arguments given, at most {max} allowed",
            args.len()
        )));
    }
    if let Some(pos) = args.iter().position(|a| a.contains('\0')) {
        return Err(ResolveError::InvalidArguments(format!(
            "argument {pos} contains a NUL byte"
        )));
    }
    Ok(())
}

/// Turns a [`JobSubmission`] into a [`JobRunManifest`].
pub struct JobManifestResolver {
    builds: BuildService,
    labels: Arc<dyn LabelCatalog>,
    environments: Arc<dyn EnvironmentCatalog>,
    clusters: Arc<dyn ClusterCatalog>,
    max_labels: usize,
    max_arguments: usize,
}

impl JobManifestResolver {
    pub fn new(
        builds: BuildService,
        labels: Arc<dyn LabelCatalog>,
        environments: Arc<dyn EnvironmentCatalog>,
        clusters: Arc<dyn ClusterCatalog>,
        config: &BuildConfig,
    ) -> Self {
        Self {
            builds,
            labels,
            environments,
            clusters,
            max_labels: config.max_labels,
            max_arguments: config.max_arguments,
        }
    }

    /// Resolve every part of the submission; the first error aborts.
    #[instrument(level = "debug", skip(self, sub, opts), fields(workspace = %sub.workspace_id, package = %sub.package_id))]
    pub async fn resolve(
        &self,
        sub: &JobSubmission,
        opts: &WaitOptions,
    ) -> Result<JobRunManifest, ResolveError> {
        let ws = &sub.workspace_id;
        if ws.is_blank() {
            return Err(ResolveError::InvalidWorkspace);
        }

        let git_repo = resolve_git_repo(self.labels.as_ref(), ws, sub.git_repo_id.as_ref()).await?;
        let labels = resolve_labels(self.labels.as_ref(), ws, &sub.label_ids, self.max_labels).await?;
        let env = resolve_environment(ws, &sub.env, self.environments.as_ref()).await?;
        let array = plan_array(&sub.array)?;
        let resources = validate_resources(&sub.resources)?;
        validate_arguments(&sub.args, self.max_arguments)?;

        self.clusters
            .cluster(ws, &sub.cluster_id)
            .await?
            .ok_or_else(|| ResolveError::InvalidCluster(sub.cluster_id.clone()))?;
        debug!("submission references resolved");

        let package = self.builds.package(ws, &sub.package_id).await?;
        let ticket = self.builds.request_build(&package).await?;

        let task = if ticket.task.status.is_terminal() {
            ticket.task
        } else {
            self.builds.wait(&ticket.task.id, opts).await?
        };
        if task.status != BuildTaskStatus::Succeeded {
            return Err(ResolveError::BuildUnsuccessful {
                task: task.id,
                status: task.status,
                note: task.last_activity,
            });
        }
        let artifact = self.builds.artifact(&task).await?;
        info!(build_task = %task.id, image = %artifact.image, "job manifest resolved");

        Ok(JobRunManifest {
            workspace_id: ws.clone(),
            cluster_id: sub.cluster_id.clone(),
            package_id: sub.package_id.clone(),
            git_repo,
            labels,
            args: sub.args.clone(),
            array,
            env,
            resources,
            artifact: artifact.image,
            build_task_id: task.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use kiln_model::ErrorCode;

    use super::*;

    #[test]
    fn argument_count_is_bounded() {
        let args = vec!["a".to_string(); 3];
        assert!(validate_arguments(&args, 3).is_ok());
        let err = validate_arguments(&args, 2).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidJobArguments);
    }

    #[test]
    fn nul_bytes_are_rejected() {
        let args = vec!["ok".to_string(), "bad\0arg".to_string()];
        let err = validate_arguments(&args, 10).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidArguments(msg) if msg.contains("argument 1")));
    }
}

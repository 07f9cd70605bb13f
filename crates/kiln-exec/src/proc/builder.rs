use std::path::PathBuf;

use async_trait::async_trait;
use kiln_core::ports::{BuildError, ImageBuilder};
use kiln_model::{BuildOutput, BuildSpec, BuildTask};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::ToolCommand;

pub const SPEC_FILE_NAME: &str = "Containerfile";

/// Builds images by writing the rendered spec into a per-task context directory and invoking
/// the configured toolchain command.
///
/// Placeholders: `{context}` (context directory), `{file}` (spec file), `{tag}` (local tag).
pub struct ProcBuilder {
    command: ToolCommand,
    work_dir: PathBuf,
    tag_prefix: String,
}

impl ProcBuilder {
    pub fn new(command: ToolCommand, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            work_dir: work_dir.into(),
            tag_prefix: "kiln".to_string(),
        }
    }

    pub fn with_tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_prefix = prefix.into();
        self
    }

    pub fn local_tag(&self, task: &BuildTask) -> String {
        format!("{}/{}", self.tag_prefix, task.id)
    }
}

#[async_trait]
impl ImageBuilder for ProcBuilder {
    #[instrument(level = "debug", skip_all, fields(task = %task.id, class = %spec.class))]
    async fn build(
        &self,
        task: &BuildTask,
        spec: &BuildSpec,
        cancel: CancellationToken,
    ) -> Result<BuildOutput, BuildError> {
        let context = self.work_dir.join(task.id.as_str());
        let file = context.join(SPEC_FILE_NAME);
        tokio::fs::create_dir_all(&context)
            .await
            .map_err(|e| BuildError::Transient(format!("create {}: {e}", context.display())))?;
        tokio::fs::write(&file, spec.content.as_bytes())
            .await
            .map_err(|e| BuildError::Transient(format!("write {}: {e}", file.display())))?;

        let tag = self.local_tag(task);
        let context_str = context.to_string_lossy();
        let file_str = file.to_string_lossy();
        let result = self
            .command
            .run(
                &[
                    ("context", &*context_str),
                    ("file", &*file_str),
                    ("tag", tag.as_str()),
                ],
                &[],
                &cancel,
            )
            .await;

        if let Err(e) = tokio::fs::remove_dir_all(&context).await {
            warn!(error = %e, dir = %context.display(), "build context not removed");
        }
        result?;

        info!(image = %tag, "image built");
        Ok(BuildOutput {
            image: tag,
            fingerprint: task.fingerprint.clone(),
        })
    }
}

use async_trait::async_trait;
use kiln_core::ports::{ImagePusher, PushError, PushTarget};
use kiln_model::{BuildOutput, RegistryCredential};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::ToolCommand;

pub const ENV_REGISTRY_USER: &str = "KILN_REGISTRY_USER";
pub const ENV_REGISTRY_PASSWORD: &str = "KILN_REGISTRY_PASSWORD";

/// Pushes images with the configured toolchain command.
///
/// Placeholders: `{image}` (local image), `{target}` (full reference), `{overwrite}`
/// (`true`/`false`). The credential is passed in the environment, never on the command line.
pub struct ProcPusher {
    command: ToolCommand,
    transient_exit_codes: Vec<i32>,
}

impl ProcPusher {
    pub fn new(command: ToolCommand) -> Self {
        Self {
            command,
            transient_exit_codes: Vec::new(),
        }
    }

    /// Exit codes the toolchain uses for retryable failures (network, registry 5xx).
    pub fn with_transient_exit_codes(mut self, codes: impl Into<Vec<i32>>) -> Self {
        self.transient_exit_codes = codes.into();
        self
    }
}

#[async_trait]
impl ImagePusher for ProcPusher {
    #[instrument(level = "debug", skip_all, fields(image = %output.image, target = %target.reference))]
    async fn push(
        &self,
        output: &BuildOutput,
        target: &PushTarget,
        credential: &RegistryCredential,
        cancel: CancellationToken,
    ) -> Result<(), PushError> {
        let reference = target.reference.to_string();
        let overwrite = if target.overwrite { "true" } else { "false" };
        self.command
            .run(
                &[
                    ("image", output.image.as_str()),
                    ("target", reference.as_str()),
                    ("overwrite", overwrite),
                ],
                &[
                    (ENV_REGISTRY_USER, credential.username.as_str()),
                    (ENV_REGISTRY_PASSWORD, credential.password_encrypted.as_str()),
                ],
                &cancel,
            )
            .await
            .map_err(|e| e.into_push_error(&self.transient_exit_codes))?;

        info!("image pushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use kiln_model::{ArtifactRef, RegistryId};

    use super::*;

    fn output() -> BuildOutput {
        BuildOutput {
            image: "kiln/bt-1".into(),
            fingerprint: "f00d".into(),
        }
    }

    fn target() -> PushTarget {
        PushTarget {
            reference: ArtifactRef {
                registry: "registry.local:5000".into(),
                repository: "ws/pkg".into(),
                tag: "fp-f00d".into(),
            },
            overwrite: false,
        }
    }

    fn credential() -> RegistryCredential {
        RegistryCredential {
            registry_id: RegistryId::from("reg"),
            workspace_id: None,
            username: "bot".into(),
            password_encrypted: "s3cret".into(),
            pull_allowed: true,
            push_allowed: true,
        }
    }

    #[tokio::test]
    async fn placeholders_and_credentials_reach_the_tool() {
        let script = "test {image} = kiln/bt-1 \
            && test {target} = registry.local:5000/ws/pkg:fp-f00d \
            && test {overwrite} = false \
            && test \"$KILN_REGISTRY_USER\" = bot \
            && test \"$KILN_REGISTRY_PASSWORD\" = s3cret";
        let pusher = ProcPusher::new(ToolCommand::new("sh", ["-c", script]));
        pusher
            .push(&output(), &target(), &credential(), CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn exit_codes_map_to_rejected_or_transient() {
        let pusher = ProcPusher::new(ToolCommand::new("sh", ["-c", "exit 75"]));
        let err = pusher
            .push(&output(), &target(), &credential(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PushError::Rejected(_)));

        let pusher = pusher.with_transient_exit_codes([75]);
        let err = pusher
            .push(&output(), &target(), &credential(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PushError::Transient(_)));
    }
}

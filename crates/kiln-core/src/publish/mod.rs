//! Registry publishing.
//!
//! Each call is a single attempt. Retrying transient failures is left to the build runner.

use std::sync::Arc;

use kiln_model::{
    ArtifactRef, BuildOutput, ErrorCode, PackageId, RegistryCredential, RegistryId, RegistryInfo,
    WorkspaceId,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::{
    clock::Clock,
    config::{BuildConfig, PushIdempotency},
    ports::{CredentialStore, ImagePusher, PushError, PushTarget},
};

mod cache;
pub use cache::CredentialCache;

/// Number of fingerprint characters used in content-addressed tags.
const TAG_HEX_LEN: usize = 12;

#[derive(Debug, Clone, Error)]
pub enum PublishError {
    #[error("registry {0} not found")]
    InvalidRegistry(RegistryId),
    #[error("no credential with push permission for registry {0}")]
    InvalidCredentials(RegistryId),
    #[error("transient publish error: {0}")]
    Transient(String),
    #[error("push rejected: {0}")]
    Rejected(String),
    #[error("publish cancelled")]
    Cancelled,
}

impl PublishError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PublishError::Transient(_))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            PublishError::InvalidRegistry(_) => ErrorCode::InvalidRegistry,
            PublishError::InvalidCredentials(_) => ErrorCode::InvalidRegistryCredentials,
            _ => ErrorCode::UnknownError,
        }
    }
}

impl From<PushError> for PublishError {
    fn from(e: PushError) -> Self {
        match e {
            PushError::Transient(msg) => PublishError::Transient(msg),
            PushError::Rejected(msg) => PublishError::Rejected(msg),
            PushError::Cancelled => PublishError::Cancelled,
        }
    }
}

/// What is being published and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    pub workspace_id: WorkspaceId,
    pub package_id: PackageId,
    pub registry_id: RegistryId,
    pub fingerprint: String,
}

/// Pushes built images to the registry of their package.
pub struct RegistryPublisher {
    credentials: Arc<dyn CredentialStore>,
    pusher: Arc<dyn ImagePusher>,
    cache: CredentialCache,
    idempotency: PushIdempotency,
    moving_tag: String,
}

impl RegistryPublisher {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        pusher: Arc<dyn ImagePusher>,
        clock: Arc<dyn Clock>,
        config: &BuildConfig,
    ) -> Self {
        let cache = CredentialCache::new(credentials.clone(), clock, config.credential_ttl());
        Self {
            credentials,
            pusher,
            cache,
            idempotency: config.push,
            moving_tag: config.moving_tag.clone(),
        }
    }

    /// Destination of a push under the configured idempotency mode.
    pub fn push_target(&self, registry: &RegistryInfo, target: &PublishTarget) -> PushTarget {
        let (tag, overwrite) = match self.idempotency {
            PushIdempotency::ContentAddressed => {
                let short: String = target.fingerprint.chars().take(TAG_HEX_LEN).collect();
                (format!("fp-{short}"), false)
            }
            PushIdempotency::TagOverwrite => (self.moving_tag.clone(), true),
        };
        PushTarget {
            reference: ArtifactRef {
                registry: registry.address.clone(),
                repository: format!("{}/{}", target.workspace_id, target.package_id),
                tag,
            },
            overwrite,
        }
    }

    /// Resolve the registry and a credential allowed to push to it.
    pub async fn preflight(
        &self,
        registry: &RegistryId,
        workspace: &WorkspaceId,
    ) -> Result<(RegistryInfo, RegistryCredential), PublishError> {
        let info = self
            .credentials
            .registry(registry)
            .await
            .map_err(|e| PublishError::Transient(e.to_string()))?
            .ok_or_else(|| PublishError::InvalidRegistry(registry.clone()))?;

        let cred = self
            .cache
            .resolve(registry, workspace)
            .await
            .map_err(|e| PublishError::Transient(e.to_string()))?
            .filter(|c| c.push_allowed)
            .ok_or_else(|| PublishError::InvalidCredentials(registry.clone()))?;

        Ok((info, cred))
    }

    #[instrument(level = "debug", skip(self, output, cancel), fields(workspace = %target.workspace_id, package = %target.package_id))]
    pub async fn publish(
        &self,
        output: &BuildOutput,
        target: &PublishTarget,
        cancel: CancellationToken,
    ) -> Result<ArtifactRef, PublishError> {
        let (info, cred) = self.preflight(&target.registry_id, &target.workspace_id).await?;
        let push = self.push_target(&info, target);

        self.pusher.push(output, &push, &cred, cancel).await?;
        debug!(image = %push.reference, overwrite = push.overwrite, "image pushed");
        Ok(push.reference)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::{clock::SystemClock, memory::MemoryCatalog};

    #[derive(Default)]
    struct RecordingPusher {
        pushed: Mutex<Vec<PushTarget>>,
    }

    #[async_trait]
    impl ImagePusher for RecordingPusher {
        async fn push(
            &self,
            _output: &BuildOutput,
            target: &PushTarget,
            _credential: &RegistryCredential,
            _cancel: CancellationToken,
        ) -> Result<(), PushError> {
            self.pushed
                .lock()
                .unwrap()
                .push(target.clone());
            Ok(())
        }
    }

    fn catalog(push_allowed: bool) -> MemoryCatalog {
        let cat = MemoryCatalog::new();
        cat.add_registry(RegistryInfo {
            id: RegistryId::from("reg"),
            address: "registry.local:5000".into(),
        });
        cat.add_credential(RegistryCredential {
            registry_id: RegistryId::from("reg"),
            workspace_id: Some(WorkspaceId::from("ws")),
            username: "ws-bot".into(),
            password_encrypted: "enc".into(),
            pull_allowed: true,
            push_allowed,
        });
        cat
    }

    fn target(registry: &str) -> PublishTarget {
        PublishTarget {
            workspace_id: WorkspaceId::from("ws"),
            package_id: PackageId::from("pkg"),
            registry_id: RegistryId::from(registry),
            fingerprint: "0123456789abcdef0123".into(),
        }
    }

    fn output() -> BuildOutput {
        BuildOutput {
            image: "sha256:feed".into(),
            fingerprint: "0123456789abcdef0123".into(),
        }
    }

    fn publisher(
        cat: MemoryCatalog,
        pusher: Arc<RecordingPusher>,
        push: PushIdempotency,
    ) -> RegistryPublisher {
        let config = BuildConfig {
            push,
            ..Default::default()
        };
        RegistryPublisher::new(Arc::new(cat), pusher, Arc::new(SystemClock), &config)
    }

    #[tokio::test]
    async fn content_addressed_tag() {
        let pusher = Arc::new(RecordingPusher::default());
        let p = publisher(catalog(true), pusher.clone(), PushIdempotency::ContentAddressed);

        let image = p
            .publish(&output(), &target("reg"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(image.to_string(), "registry.local:5000/ws/pkg:fp-0123456789ab");
        assert!(!pusher.pushed.lock().unwrap()[0].overwrite);
    }

    #[tokio::test]
    async fn moving_tag_overwrites() {
        let pusher = Arc::new(RecordingPusher::default());
        let p = publisher(catalog(true), pusher.clone(), PushIdempotency::TagOverwrite);

        let image = p
            .publish(&output(), &target("reg"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(image.tag, "latest");
        assert!(pusher.pushed.lock().unwrap()[0].overwrite);
    }

    #[tokio::test]
    async fn unknown_registry() {
        let p = publisher(
            catalog(true),
            Arc::new(RecordingPusher::default()),
            PushIdempotency::default(),
        );
        let err = p
            .publish(&output(), &target("missing"), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRegistry);
    }

    #[tokio::test]
    async fn credential_without_push_permission() {
        let pusher = Arc::new(RecordingPusher::default());
        let p = publisher(catalog(false), pusher.clone(), PushIdempotency::default());
        let err = p
            .publish(&output(), &target("reg"), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRegistryCredentials);
        assert!(pusher.pushed.lock().unwrap().is_empty());
    }
}

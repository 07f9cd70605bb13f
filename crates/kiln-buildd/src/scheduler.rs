use std::sync::Arc;

use async_trait::async_trait;
use kiln_core::ports::{ClusterScheduler, PortError};
use kiln_model::JobRunManifest;
use tracing::info;

/// Stand-in scheduler: records accepted manifests in the log.
pub struct LogScheduler;

#[async_trait]
impl ClusterScheduler for LogScheduler {
    async fn accept(&self, manifest: Arc<JobRunManifest>) -> Result<(), PortError> {
        let json = serde_json::to_string(manifest.as_ref())
            .map_err(|e| PortError::new(format!("encoding manifest: {e}")))?;
        info!(
            workspace = %manifest.workspace_id,
            cluster = %manifest.cluster_id,
            replicas = manifest.array.replicas,
            manifest = %json,
            "job accepted"
        );
        Ok(())
    }
}

use kiln_model::{EnvLayers, EnvPlan, EnvironmentMap, WorkspaceId};
use tracing::debug;

use super::ReferenceError;
use crate::ports::EnvironmentCatalog;

/// Merge the named sets in `use` order, then the overrides.
///
/// Later sets replace earlier ones key for key; overrides always win.
pub async fn resolve_environment(
    workspace: &WorkspaceId,
    plan: &EnvPlan,
    catalog: &dyn EnvironmentCatalog,
) -> Result<EnvironmentMap, ReferenceError> {
    let mut layers = EnvLayers::new();

    for name in &plan.use_sets {
        let set = catalog
            .environment(workspace, name)
            .await?
            .filter(|set| set.is_visible_to(workspace))
            .ok_or_else(|| ReferenceError::UnknownEnvironment(name.clone()))?;
        layers.extend_map(&set.values);
    }
    layers.extend_map(&plan.overrides);

    if let Some(kv) = layers.iter().find(|kv| kv.key().trim().is_empty()) {
        return Err(ReferenceError::InvalidEnvironmentKey(kv.key().to_string()));
    }

    let env = layers.flatten();
    debug!(workspace = %workspace, sets = plan.use_sets.len(), keys = env.len(), "environment resolved");
    Ok(env)
}

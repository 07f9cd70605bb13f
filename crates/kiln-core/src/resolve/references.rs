use std::collections::HashSet;

use kiln_model::{ErrorCode, GitRepoId, GitRepoRef, LabelId, LabelRef, WorkspaceId};
use thiserror::Error;
use tracing::debug;

use crate::ports::{LabelCatalog, PortError};

#[derive(Debug, Clone, Error)]
pub enum ReferenceError {
    #[error("{count} labels referenced, at most {max} allowed")]
    LabelsLimit { count: usize, max: usize },

    #[error("label {0} not found")]
    UnknownLabel(LabelId),

    #[error("git repository {0} not found")]
    UnknownGitRepo(GitRepoId),

    #[error("environment set '{0}' not found")]
    UnknownEnvironment(String),

    #[error("environment key '{0}' is invalid")]
    InvalidEnvironmentKey(String),

    #[error("catalog error: {0}")]
    Catalog(#[from] PortError),
}

impl ReferenceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ReferenceError::LabelsLimit { .. } => ErrorCode::InvalidJobLabelsLimit,
            ReferenceError::UnknownLabel(_) => ErrorCode::InvalidJobLabelReference,
            ReferenceError::UnknownGitRepo(_) => ErrorCode::InvalidJobGitRepo,
            ReferenceError::UnknownEnvironment(_) | ReferenceError::InvalidEnvironmentKey(_) => {
                ErrorCode::InvalidJobEnvironment
            }
            ReferenceError::Catalog(_) => ErrorCode::UnknownError,
        }
    }
}

/// Resolve label ids in first-occurrence order.
///
/// Duplicates are dropped before the limit is checked, and the limit is checked before any
/// catalog lookup.
pub async fn resolve_labels(
    catalog: &dyn LabelCatalog,
    workspace: &WorkspaceId,
    ids: &[LabelId],
    max: usize,
) -> Result<Vec<LabelRef>, ReferenceError> {
    let mut seen = HashSet::with_capacity(ids.len());
    let unique: Vec<&LabelId> = ids.iter().filter(|id| seen.insert(*id)).collect();

    if unique.len() > max {
        return Err(ReferenceError::LabelsLimit {
            count: unique.len(),
            max,
        });
    }

    let mut out = Vec::with_capacity(unique.len());
    for id in unique {
        let label = catalog
            .label(workspace, id)
            .await?
            .ok_or_else(|| ReferenceError::UnknownLabel(id.clone()))?;
        out.push(label);
    }
    debug!(workspace = %workspace, count = out.len(), "labels resolved");
    Ok(out)
}

pub async fn resolve_git_repo(
    catalog: &dyn LabelCatalog,
    workspace: &WorkspaceId,
    id: Option<&GitRepoId>,
) -> Result<Option<GitRepoRef>, ReferenceError> {
    let Some(id) = id else {
        return Ok(None);
    };
    catalog
        .git_repo(workspace, id)
        .await?
        .map(Some)
        .ok_or_else(|| ReferenceError::UnknownGitRepo(id.clone()))
}

use crate::{BuildTaskStatus, WorkspaceId};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

/// Query parameters for listing build tasks with filtering and pagination.
#[derive(Debug, Clone)]
pub struct BuildTaskQuery {
    pub workspace: Option<WorkspaceId>,
    pub status: Option<BuildTaskStatus>,
    pub limit: usize,
    pub offset: usize,
}

/// Result of a paginated build task query.
#[derive(Debug, Clone)]
pub struct BuildTaskPage<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl BuildTaskQuery {
    pub fn new() -> Self {
        Self {
            workspace: None,
            status: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }

    pub fn with_workspace(mut self, workspace: impl Into<WorkspaceId>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn with_status(mut self, status: BuildTaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.min(MAX_LIMIT);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

impl Default for BuildTaskQuery {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_capped() {
        let q = BuildTaskQuery::new().with_limit(5_000);
        assert_eq!(q.limit, MAX_LIMIT);
    }

    #[test]
    fn default_matches_new() {
        let q = BuildTaskQuery::default();
        assert_eq!(q.limit, DEFAULT_LIMIT);
        assert_eq!(q.offset, 0);
        assert!(q.workspace.is_none());
    }
}

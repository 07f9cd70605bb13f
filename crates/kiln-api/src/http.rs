use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use kiln_model::{
    ArraySpec, BuildTask, BuildTaskId, BuildTaskQuery, BuildTaskStatus, ClusterId, EnvPlan,
    GitRepoId, JobRunManifest, JobSubmission, LabelId, PackageId, RunResourcesSpec, WorkspaceId,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::ApiError, handler::ApiHandler};

/// HTTP API service builder.
pub struct HttpApi<H> {
    handler: Arc<H>,
}

impl<H> HttpApi<H>
where
    H: ApiHandler,
{
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    /// Routes:
    /// - POST /api/v1/workspaces/{ws}/jobs - Submit a job
    /// - GET /api/v1/workspaces/{ws}/build-tasks - List build tasks
    /// - GET /api/v1/workspaces/{ws}/build-tasks/{id} - Get a build task
    /// - POST /api/v1/workspaces/{ws}/packages/{pkg}/build - Request a package build
    pub fn router(self) -> Router {
        Router::new()
            .route("/api/v1/workspaces/{ws}/jobs", post(submit_job::<H>))
            .route("/api/v1/workspaces/{ws}/build-tasks", get(list_build_tasks::<H>))
            .route(
                "/api/v1/workspaces/{ws}/build-tasks/{id}",
                get(get_build_task::<H>),
            )
            .route(
                "/api/v1/workspaces/{ws}/packages/{pkg}/build",
                post(build_package::<H>),
            )
            .with_state(self.handler)
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitJobRequest {
    package_id: PackageId,
    cluster_id: ClusterId,
    #[serde(default)]
    git_repo_id: Option<GitRepoId>,
    #[serde(default)]
    label_ids: Vec<LabelId>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    array: ArraySpec,
    #[serde(default)]
    env: EnvPlan,
    #[serde(default)]
    resources: RunResourcesSpec,
}

impl SubmitJobRequest {
    fn into_submission(self, workspace_id: WorkspaceId) -> JobSubmission {
        JobSubmission {
            workspace_id,
            package_id: self.package_id,
            cluster_id: self.cluster_id,
            git_repo_id: self.git_repo_id,
            label_ids: self.label_ids,
            args: self.args,
            array: self.array,
            env: self.env,
            resources: self.resources,
        }
    }
}

#[derive(Debug, Serialize)]
struct SubmitJobResponse {
    manifest: JobRunManifest,
}

#[derive(Debug, Serialize)]
struct GetBuildTaskResponse {
    task: BuildTask,
}

#[derive(Debug, Deserialize)]
struct ListBuildTasksParams {
    status: Option<String>,
    /// Max items per page (default 100, max 1000)
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ListBuildTasksResponse {
    tasks: Vec<BuildTask>,
    total: usize,
}

// ============================================================================
// Handlers
// ============================================================================

fn workspace(ws: String) -> Result<WorkspaceId, ApiError> {
    let ws = WorkspaceId::from(ws);
    if ws.is_blank() {
        return Err(ApiError::InvalidRequest("workspace cannot be empty".into()));
    }
    Ok(ws)
}

/// POST /api/v1/workspaces/{ws}/jobs
async fn submit_job<H>(
    State(handler): State<Arc<H>>,
    Path(ws): Path<String>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let submission = req.into_submission(workspace(ws)?);
    debug!(workspace = %submission.workspace_id, package = %submission.package_id, "submitting job");
    let manifest = handler.submit_job(submission).await?;

    Ok((StatusCode::CREATED, Json(SubmitJobResponse { manifest })))
}

/// GET /api/v1/workspaces/{ws}/build-tasks
///
/// Query params (all optional):
/// - ?status=running
/// - ?limit=50
/// - ?offset=0
async fn list_build_tasks<H>(
    State(handler): State<Arc<H>>,
    Path(ws): Path<String>,
    Query(params): Query<ListBuildTasksParams>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let mut query = BuildTaskQuery::new().with_workspace(workspace(ws)?);

    if let Some(status) = params.status {
        let status = status
            .parse::<BuildTaskStatus>()
            .map_err(ApiError::InvalidRequest)?;
        query = query.with_status(status);
    }
    if let Some(limit) = params.limit {
        query = query.with_limit(limit);
    }
    if let Some(offset) = params.offset {
        query = query.with_offset(offset);
    }

    let page = handler.list_build_tasks(query).await?;
    debug!(count = page.items.len(), total = page.total, "build tasks listed");

    Ok(Json(ListBuildTasksResponse {
        tasks: page.items,
        total: page.total,
    }))
}

/// GET /api/v1/workspaces/{ws}/build-tasks/{id}
async fn get_build_task<H>(
    State(handler): State<Arc<H>>,
    Path((ws, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let ws = workspace(ws)?;
    let id = BuildTaskId::from(id);
    match handler.get_build_task(&ws, &id).await? {
        Some(task) => Ok(Json(GetBuildTaskResponse { task })),
        None => Err(ApiError::NotFound(format!("build task {id}"))),
    }
}

/// POST /api/v1/workspaces/{ws}/packages/{pkg}/build
async fn build_package<H>(
    State(handler): State<Arc<H>>,
    Path((ws, pkg)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let ws = workspace(ws)?;
    let view = handler.build_package(&ws, &PackageId::from(pkg)).await?;
    debug!(task = %view.task.id, reused = view.reused, "package build requested");

    let status = if view.reused {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(view)))
}

use kiln_model::{BuildEvent, BuildTaskStatus};
use tracing::{debug, error, info, warn};

#[inline]
pub fn message_for(from: Option<BuildTaskStatus>, to: BuildTaskStatus) -> &'static str {
    match (from, to) {
        (None, BuildTaskStatus::Pending) => "build task queued",
        (_, BuildTaskStatus::Pending) => "build task requeued",
        (_, BuildTaskStatus::Running) => "build task started",
        (_, BuildTaskStatus::Succeeded) => "build task succeeded",
        (Some(BuildTaskStatus::Pending), BuildTaskStatus::Failed) => "build task rejected",
        (_, BuildTaskStatus::Failed) => "build task failed",
        (_, BuildTaskStatus::TimedOut) => "build task timed out",
    }
}

#[inline]
pub fn log_event(e: &BuildEvent) {
    let msg = message_for(e.from, e.to);
    let task = e.task_id.as_str();
    let workspace = e.workspace_id.as_str();

    match e.to {
        BuildTaskStatus::Pending => debug!(task, workspace, note = %e.note, "{msg}"),
        BuildTaskStatus::Running => info!(task, workspace, "{msg}"),
        BuildTaskStatus::Succeeded => {
            info!(task, workspace, running_ms = e.running_ms.unwrap_or(0), "{msg}")
        }
        BuildTaskStatus::TimedOut => warn!(
            task,
            workspace,
            running_ms = e.running_ms.unwrap_or(0),
            note = %e.note,
            "{msg}"
        ),
        BuildTaskStatus::Failed => error!(
            task,
            workspace,
            running_ms = e.running_ms.unwrap_or(0),
            note = %e.note,
            "{msg}"
        ),
    }
}

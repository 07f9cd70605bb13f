use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Lifecycle state of a build task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BuildTaskStatus {
    /// Waiting for build capacity.
    Pending,
    /// Build and publish are in progress.
    Running,
    /// Artifact built and pushed.
    Succeeded,
    /// Build failed with an unrecoverable error or exhausted its retries.
    Failed,
    /// The task outlived the deadline of its status.
    TimedOut,
}

impl BuildTaskStatus {
    /// Returns `true` if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildTaskStatus::Succeeded | BuildTaskStatus::Failed | BuildTaskStatus::TimedOut
        )
    }

    /// Returns `true` if the task is still active (pending or running).
    pub fn is_active(&self) -> bool {
        matches!(self, BuildTaskStatus::Pending | BuildTaskStatus::Running)
    }

    /// Returns `true` for terminal states that a retry may re-enter from.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BuildTaskStatus::Failed | BuildTaskStatus::TimedOut)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildTaskStatus::Pending => "pending",
            BuildTaskStatus::Running => "running",
            BuildTaskStatus::Succeeded => "succeeded",
            BuildTaskStatus::Failed => "failed",
            BuildTaskStatus::TimedOut => "timedOut",
        }
    }
}

impl fmt::Display for BuildTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildTaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(BuildTaskStatus::Pending),
            "running" => Ok(BuildTaskStatus::Running),
            "succeeded" => Ok(BuildTaskStatus::Succeeded),
            "failed" => Ok(BuildTaskStatus::Failed),
            "timedout" | "timed_out" | "timeout" => Ok(BuildTaskStatus::TimedOut),
            _ => Err(format!(
                "invalid status: '{s}' (valid: pending, running, succeeded, failed, timedOut)"
            )),
        }
    }
}

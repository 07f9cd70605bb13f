//! Container toolchain driven as child processes.
//!
//! The builder and the pusher share one way of running a command: stdout is streamed to
//! trace logs, the tail of stderr is kept for the error message, and cancellation terminates
//! the child gracefully.

use std::{collections::VecDeque, path::PathBuf, process::Stdio, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    error::{ExecError, ExecResult},
    util::{cmd_program, kill_graceful, render_args},
    utils::limits::{RlimitConfig, attach_rlimits},
};

mod builder;
pub use builder::ProcBuilder;

mod pusher;
pub use pusher::ProcPusher;

const STDERR_TAIL_LINES: usize = 20;

/// One toolchain command with `{placeholder}` arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub rlimits: RlimitConfig,
    /// Time between SIGTERM and SIGKILL on cancellation.
    pub kill_grace_ms: u64,
}

impl Default for ToolCommand {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            rlimits: RlimitConfig::default(),
            kill_grace_ms: 5_000,
        }
    }
}

impl ToolCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_rlimits(mut self, rlimits: RlimitConfig) -> Self {
        self.rlimits = rlimits;
        self
    }

    /// Run with placeholders substituted and `extra_env` added on top of `env`.
    pub(crate) async fn run(
        &self,
        vars: &[(&str, &str)],
        extra_env: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> ExecResult<()> {
        if self.program.is_empty() {
            return Err(ExecError::MissingProgram);
        }

        let args = render_args(&self.args, vars);
        trace!(target: "kiln.exec.proc", program = %self.program, args = ?args, "spawn");

        let mut cmd = cmd_program(&self.program, &args);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        for (k, v) in extra_env {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        attach_rlimits(&mut cmd, &self.rlimits);

        let mut child = cmd.spawn().map_err(|e| ExecError::Spawn(e.to_string()))?;

        let read_stdout = child.stdout.take().map(|stdout| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    trace!(target: "kiln.exec.proc.out", %line);
                }
            })
        });
        let read_stderr = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    trace!(target: "kiln.exec.proc.err", %line);
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                Vec::from(tail).join("\n")
            })
        });

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                if let Some(h) = read_stdout {
                    let _ = h.await;
                }
                let stderr = match read_stderr {
                    Some(h) => h.await.unwrap_or_default(),
                    None => String::new(),
                };

                if status.success() {
                    debug!(target: "kiln.exec.proc", program = %self.program, "exit success");
                    return Ok(());
                }
                match status.code() {
                    Some(code) => Err(ExecError::NonZeroExit { code, stderr }),
                    None => Err(ExecError::KilledBySignal),
                }
            }
            _ = cancel.cancelled() => {
                debug!(target: "kiln.exec.proc", program = %self.program, "cancelled; killing child");
                let _ = kill_graceful(&mut child, Duration::from_millis(self.kill_grace_ms)).await;
                Err(ExecError::Cancelled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> ToolCommand {
        ToolCommand::new("sh", ["-c", script])
    }

    #[tokio::test]
    async fn success_and_placeholders() {
        let cmd = sh("test \"$GREETING\" = {word}").with_env("GREETING", "hello");
        cmd.run(&[("word", "hello")], &[], &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_zero_exit_keeps_stderr_tail() {
        let err = sh("echo first >&2; echo last >&2; exit 3")
            .run(&[], &[], &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ExecError::NonZeroExit { code, stderr } => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "first\nlast");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_program_and_spawn_failure() {
        let err = ToolCommand::default()
            .run(&[], &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::MissingProgram));

        let err = ToolCommand::new("/nonexistent/kiln-tool", Vec::<String>::new())
            .run(&[], &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Spawn(_)));
    }

    #[tokio::test]
    async fn cancellation_terminates_child() {
        let mut cmd = sh("sleep 30");
        cmd.kill_grace_ms = 200;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = cmd.run(&[], &[], &cancel).await.unwrap_err();
        assert!(matches!(err, ExecError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}

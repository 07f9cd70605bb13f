use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use super::{BuildMachine, BuildRunner};
use crate::error::CoreError;

/// Counts of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub timed_out: usize,
    pub promoted: usize,
}

/// Periodic liveness and promotion sweeps.
///
/// A pass first times out overdue tasks, then promotes pending tasks into the freed capacity and
/// spawns a [`BuildRunner`] for each of them.
pub struct Sweeper {
    machine: Arc<BuildMachine>,
    runner: Arc<BuildRunner>,
}

impl Sweeper {
    pub fn new(machine: Arc<BuildMachine>, runner: Arc<BuildRunner>) -> Self {
        Self { machine, runner }
    }

    /// Request an immediate pass.
    pub fn kick(&self) {
        self.machine.wake();
    }

    #[instrument(level = "trace", skip(self))]
    pub async fn tick(&self) -> Result<SweepReport, CoreError> {
        let timed_out = self.machine.sweep_overdue().await?.len();
        let promoted = self.machine.promote().await?;

        for task in &promoted {
            let runner = Arc::clone(&self.runner);
            let task = task.clone();
            tokio::spawn(async move { runner.run(task).await });
        }

        Ok(SweepReport {
            timed_out,
            promoted: promoted.len(),
        })
    }

    /// Sweep on every interval tick and on every wakeup until `cancel` fires.
    ///
    /// In-flight runs are cancelled on exit; `recover` on the next start marks them failed.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.machine.config().sweep_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(every_ms = self.machine.config().sweep_interval_ms, "build sweeper started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
                _ = self.machine.wakeups().notified() => {}
            }

            match self.tick().await {
                Ok(report) if report != SweepReport::default() => {
                    debug!(timed_out = report.timed_out, promoted = report.promoted, "sweep pass");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "sweep pass failed"),
            }
        }

        self.machine.cancel_runs();
        info!("build sweeper stopped");
    }
}

//! Daemon configuration: one JSON file, with a few `KILN_*` environment overrides.

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use kiln_core::BuildConfig;
use kiln_exec::ToolCommand;
use kiln_observe::{LoggerConfig, LoggerFormat};
use serde::{Deserialize, Serialize};

pub const ENV_CONFIG: &str = "KILN_CONFIG";
pub const ENV_LISTEN: &str = "KILN_LISTEN";
pub const ENV_LOG_LEVEL: &str = "KILN_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "KILN_LOG_FORMAT";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DaemonConfig {
    pub listen: SocketAddr,
    pub logger: LoggerConfig,
    pub build: BuildConfig,
    /// Image build command; see `kiln_exec::ProcBuilder` for placeholders.
    pub builder: ToolCommand,
    /// Per-task build contexts are created below this directory.
    pub work_dir: PathBuf,
    pub pusher: ToolCommand,
    pub push_transient_exit_codes: Vec<i32>,
    /// JSON `CatalogSeed`; the catalog starts empty without it.
    pub catalog: Option<PathBuf>,
    /// JSON list of extra build classes.
    pub templates: Option<PathBuf>,
    /// Bound on how long a job submission waits for its package build.
    pub submit_wait_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            logger: LoggerConfig::default(),
            build: BuildConfig::default(),
            builder: ToolCommand::new(
                "buildah",
                ["bud", "--layers", "-f", "{file}", "-t", "{tag}", "{context}"],
            ),
            work_dir: std::env::temp_dir().join("kiln"),
            pusher: ToolCommand::new(
                "sh",
                [
                    "-c",
                    "buildah push --creds \"$KILN_REGISTRY_USER:$KILN_REGISTRY_PASSWORD\" {image} docker://{target}",
                ],
            ),
            push_transient_exit_codes: Vec::new(),
            catalog: None,
            templates: None,
            submit_wait_ms: 60 * 60 * 1000,
        }
    }
}

impl DaemonConfig {
    /// Load from `KILN_CONFIG` (defaults when unset) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(listen) = var(ENV_LISTEN) {
            self.listen = listen
                .parse()
                .with_context(|| format!("{ENV_LISTEN}={listen}"))?;
        }
        if let Some(level) = var(ENV_LOG_LEVEL) {
            self.logger.level = level;
        }
        if let Some(format) = var(ENV_LOG_FORMAT) {
            self.logger.format = format
                .parse::<LoggerFormat>()
                .with_context(|| format!("{ENV_LOG_FORMAT}={format}"))?;
        }
        Ok(())
    }
}

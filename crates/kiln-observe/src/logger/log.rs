use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, fmt::time::OffsetTime, layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::logger::{config::LoggerConfig, error::LoggerError};

/// HTTP plumbing is chatty at `debug`; keep it at `warn` unless the filter names it.
const QUIET_TARGETS: &[&str] = &["hyper", "h2", "tower"];

pub struct Logger;

impl Logger {
    pub fn text(cfg: &LoggerConfig) -> Result<(), LoggerError> {
        let layer = fmt::layer()
            .with_ansi(cfg.use_color)
            .with_target(cfg.with_targets)
            .with_timer(mk_timer())
            .boxed();
        install(cfg, layer)
    }

    pub fn json(cfg: &LoggerConfig) -> Result<(), LoggerError> {
        let layer = fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(cfg.with_targets)
            .with_current_span(true)
            .with_timer(mk_timer())
            .boxed();
        install(cfg, layer)
    }

    pub fn journald(cfg: &LoggerConfig) -> Result<(), LoggerError> {
        install(cfg, mk_journald()?)
    }
}

fn install(
    cfg: &LoggerConfig,
    layer: Box<dyn Layer<Registry> + Send + Sync>,
) -> Result<(), LoggerError> {
    let filter = mk_filter(&cfg.level)?;
    let subscriber = tracing_subscriber::registry().with(layer).with(filter);
    init_with(subscriber)
}

fn mk_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    let mut directives = level.trim().to_string();
    for target in QUIET_TARGETS {
        if !directives.contains(target) {
            directives.push_str(&format!(",{target}=warn"));
        }
    }
    EnvFilter::try_new(&directives).map_err(|_| LoggerError::InvalidLogLevel(level.to_string()))
}

/// Check an `EnvFilter` directive without building a subscriber.
pub(crate) fn validate_filter(level: &str) -> Result<(), LoggerError> {
    mk_filter(level).map(|_| ())
}

fn mk_timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

fn as_error(e: impl std::fmt::Display) -> LoggerError {
    let s = e.to_string();
    if s.contains("SetGlobalDefaultError") {
        LoggerError::AlreadyInitialized
    } else {
        LoggerError::InitializationFailed(s)
    }
}

fn init_with<S>(subscriber: S) -> Result<(), LoggerError>
where
    S: Subscriber + Send + Sync + 'static,
{
    subscriber.try_init().map_err(as_error)
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn mk_journald() -> Result<Box<dyn Layer<Registry> + Send + Sync>, LoggerError> {
    let journald = tracing_journald::layer()
        .map_err(|e| LoggerError::InitializationFailed(format!("journald: {e}")))?
        .with_syslog_identifier("kiln".to_string());
    Ok(journald.boxed())
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn mk_journald() -> Result<Box<dyn Layer<Registry> + Send + Sync>, LoggerError> {
    Err(LoggerError::JournaldNotSupported)
}

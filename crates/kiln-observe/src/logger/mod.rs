//! Process-wide `tracing` subscriber for the kiln daemon.
//!
//! `kiln-buildd` calls [`logger_init`] once at startup, before the build machine and the HTTP
//! surface are assembled, so recovery and sweeper logs are already captured.

mod config;
mod error;
mod format;
mod log;

pub use config::LoggerConfig;
pub use error::LoggerError;
pub use format::LoggerFormat;

/// Install the global subscriber described by `cfg`.
///
/// The filter is validated before any output is chosen; a bad `level` never leaves a half
/// installed subscriber behind. Fails with [`LoggerError::AlreadyInitialized`] on a second call.
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    log::validate_filter(&cfg.level)?;
    match cfg.format {
        LoggerFormat::Text => log::Logger::text(cfg),
        LoggerFormat::Json => log::Logger::json(cfg),
        LoggerFormat::Journald => log::Logger::journald(cfg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_level_is_rejected_for_every_format() {
        for format in [LoggerFormat::Text, LoggerFormat::Json, LoggerFormat::Journald] {
            let cfg = LoggerConfig {
                format,
                level: "kiln_core=loud".into(),
                ..Default::default()
            };
            assert!(matches!(
                logger_init(&cfg),
                Err(LoggerError::InvalidLogLevel(s)) if s == "kiln_core=loud"
            ));
        }
    }
}

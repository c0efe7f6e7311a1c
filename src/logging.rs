//! Logging initialization for ensemble.
//!
//! Interactive sessions (`ensemble run`) log to `<state>/logs/ensemble-{datetime}.log`
//! when `logging.to_file` is set, so log lines do not interleave with the prompt.
//! Everything else logs to stderr.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Result of logging initialization
pub struct LoggingHandle {
    /// Flushes buffered log lines when dropped; keep alive until exit
    pub _guard: Option<WorkerGuard>,

    /// Path to the log file, when logging to a file
    pub log_file_path: Option<PathBuf>,
}

/// Whether log output goes to a file for this invocation
pub fn logs_to_file(config: &Config, interactive: bool) -> bool {
    interactive && config.logging.to_file
}

/// Log file name for a given start time
pub fn log_file_name(timestamp: chrono::DateTime<chrono::Utc>) -> String {
    format!("ensemble-{}.log", timestamp.format("%Y%m%dT%H%M%SZ"))
}

/// Filter directive in precedence order: `RUST_LOG`, then `--debug`, then
/// `logging.level`
pub fn filter_directive(config: &Config, debug_override: bool, rust_log: Option<String>) -> String {
    match rust_log {
        Some(directive) if !directive.trim().is_empty() => directive,
        _ if debug_override => "debug".to_string(),
        _ => config.logging.level.clone(),
    }
}

/// Open a fresh session log under `<state>/logs`
fn open_log_file(config: &Config) -> Result<(PathBuf, NonBlocking, WorkerGuard)> {
    let logs_dir = config.logs_path();
    std::fs::create_dir_all(&logs_dir)
        .with_context(|| format!("Failed to create log directory {}", logs_dir.display()))?;

    let file_name = log_file_name(chrono::Utc::now());
    let appender = tracing_appender::rolling::never(&logs_dir, &file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Ok((logs_dir.join(file_name), writer, guard))
}

/// Install the global subscriber.
///
/// Interactive sessions with `logging.to_file` write plain text to a session
/// log; everything else writes to stderr.
pub fn init_logging(
    config: &Config,
    interactive: bool,
    debug_override: bool,
) -> Result<LoggingHandle> {
    let directive = filter_directive(config, debug_override, std::env::var("RUST_LOG").ok());

    let (writer, guard, log_file_path) = if logs_to_file(config, interactive) {
        let (path, writer, guard) = open_log_file(config)?;
        (BoxMakeWriter::new(writer), Some(guard), Some(path))
    } else {
        (BoxMakeWriter::new(std::io::stderr), None, None)
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(&directive))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(log_file_path.is_none())
                .with_writer(writer),
        )
        .try_init()
        .context("Failed to install log subscriber")?;

    tracing::debug!(filter = %directive, log_file = ?log_file_path, "Logging initialized");

    Ok(LoggingHandle {
        _guard: guard,
        log_file_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.paths.state = temp_dir.path().to_string_lossy().to_string();
        config
    }

    #[test]
    fn test_logs_path_under_state() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);

        let logs_dir = config.logs_path();
        assert!(logs_dir.ends_with("logs"));
        assert!(logs_dir.starts_with(temp_dir.path()));
    }

    #[test]
    fn test_log_file_name_format() {
        let ts = chrono::Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        assert_eq!(log_file_name(ts), "ensemble-20240309T140500Z.log");
    }

    #[test]
    fn test_filter_directive_precedence() {
        let mut config = Config::default();
        config.logging.level = "warn".to_string();

        assert_eq!(filter_directive(&config, false, None), "warn");
        assert_eq!(filter_directive(&config, true, None), "debug");
        assert_eq!(
            filter_directive(&config, true, Some("ensemble=trace".to_string())),
            "ensemble=trace"
        );
        assert_eq!(filter_directive(&config, false, Some("  ".to_string())), "warn");
    }

    #[test]
    fn test_open_log_file_creates_logs_dir() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);

        let (path, _writer, guard) = open_log_file(&config).unwrap();
        drop(guard);

        assert!(config.logs_path().is_dir());
        assert!(path.starts_with(config.logs_path()));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("ensemble-") && name.ends_with(".log"));
    }

    #[test]
    fn test_file_logging_only_for_interactive_sessions() {
        // init_logging installs a global subscriber, so only the decision is tested
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir);
        config.logging.to_file = true;

        assert!(logs_to_file(&config, true));
        assert!(!logs_to_file(&config, false));

        config.logging.to_file = false;
        assert!(!logs_to_file(&config, true));
    }
}

//! Log setup.
//!
//! Logs go to a daily rolling `chatz.log` under `$CHATZ_HOME/logs`, never
//! to stdout, which carries chat output.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LoggingConfig;

/// Env var that overrides the configured filter.
pub const LOG_ENV: &str = "CHATZ_LOG";

pub const LOG_FILE_NAME: &str = "chatz.log";

/// Builds the filter from `CHATZ_LOG`, falling back to the configured level.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level)
        .with_context(|| format!("Invalid logging.level '{}'", config.level))
}

/// Installs the global subscriber writing to `log_dir`.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the background writer. A subscriber installed earlier
/// (tests, embedding hosts) is left in place.
pub fn init(config: &LoggingConfig, log_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let filter = build_filter(config)?;
    let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer().with_writer(writer).with_ansi(false);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init();

    Ok(guard)
}

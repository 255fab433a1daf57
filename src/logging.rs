//! Tracing setup for the CLI.
//!
//! Human-readable events go to stderr so hook output on stdout stays clean.
//! When a data directory exists, a daily-rolling file under `.phasegate/logs/`
//! receives the same events as JSON lines.
//!
//! The filter comes from `PHASEGATE_LOG`, then `RUST_LOG`, then `info`.
//! `--verbose` adds `phasegate=debug` on top of whichever applies.

use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_ENV: &str = "PHASEGATE_LOG";
pub const LOG_FILE_PREFIX: &str = "phasegate.log";

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub verbose: bool,
    /// Write stderr events as JSON instead of the compact format
    pub json: bool,
    /// Directory for the rolling log file; `None` disables file output
    pub log_dir: Option<PathBuf>,
}

/// Keeps the file writer alive; dropping it flushes buffered events.
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

pub fn build_filter(verbose: bool) -> EnvFilter {
    let base = std::env::var(LOG_ENV)
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "info".to_string());
    let directives = if verbose {
        format!("{},phasegate=debug", base)
    } else {
        base
    };
    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(config: &LoggingConfig) -> LoggingGuard {
    let (file_layer, guard) = match config.log_dir.as_deref().and_then(file_writer) {
        Some((writer, guard)) => (
            Some(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_filter(build_filter(config.verbose)),
            ),
            Some(guard),
        ),
        None => (None, None),
    };

    let stderr_json = config.json.then(|| {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(build_filter(config.verbose))
    });
    let stderr_plain = (!config.json).then(|| {
        fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(build_filter(config.verbose))
    });

    let _ = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_json)
        .with(stderr_plain)
        .try_init();

    LoggingGuard { _file: guard }
}

fn file_writer(dir: &Path) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    // Only log to disk inside an initialized project.
    if !dir.parent().is_some_and(|p| p.is_dir()) {
        return None;
    }
    std::fs::create_dir_all(dir).ok()?;
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    Some(tracing_appender::non_blocking(appender))
}

//! Process-level runtime support for digest-flow binaries.
//!
//! Currently this is the tracing setup: every binary logs to stderr, and can
//! additionally keep a daily-rolling log file when a log directory is given.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_FILE_PREFIX: &str = "digest-flow.log";

/// Where tracing output goes for one process.
#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    /// Directory for daily-rolling log files. Stderr only when `None`.
    pub log_dir: Option<PathBuf>,
    /// File name prefix for the rolling appender. Empty means the default.
    pub file_prefix: String,
}

/// Holds the non-blocking file writer open until the process exits.
#[must_use = "dropping the guard stops the file writer"]
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global tracing subscriber.
///
/// The filter defaults to `info` and can be overridden through `RUST_LOG`.
pub fn init_tracing(options: &LoggingOptions) -> Result<LoggingGuard> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let Some(dir) = options.log_dir.as_deref() else {
        tracing_subscriber::registry()
            .with(build_env_filter())
            .with(stderr_layer)
            .try_init()
            .context("failed to install tracing subscriber")?;
        return Ok(LoggingGuard {
            _file_guard: None,
        });
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log dir {}", dir.display()))?;
    let appender = tracing_appender::rolling::daily(dir, file_prefix(options));
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = fmt::layer().with_writer(writer).with_ansi(false);

    tracing_subscriber::registry()
        .with(build_env_filter())
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(LoggingGuard {
        _file_guard: Some(guard),
    })
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn file_prefix(options: &LoggingOptions) -> &str {
    let prefix = options.file_prefix.trim();
    if prefix.is_empty() {
        DEFAULT_FILE_PREFIX
    } else {
        prefix
    }
}

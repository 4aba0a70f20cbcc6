//! Operator log: every tracing event goes to `<prefix>/logs/gpkgswap.log`,
//! warnings and errors also go to stderr. `RUST_LOG` overrides the default
//! `info` filter.

use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use gpkgswap_engine::SwapLayout;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Keeps the file writer alive; dropping it flushes the log.
pub(crate) struct LoggingGuard {
    _file_guard: WorkerGuard,
}

pub(crate) fn log_file_path(layout: &SwapLayout) -> PathBuf {
    layout.logs_dir().join(layout.log_file_name())
}

pub(crate) fn init_logging(layout: &SwapLayout) -> Result<LoggingGuard> {
    let log_dir = layout.logs_dir();
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory: {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::never(&log_dir, layout.log_file_name());
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(false);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(LevelFilter::WARN);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

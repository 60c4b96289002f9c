use std::fs;
use std::path::Path;

use anyhow::{anyhow, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::config::project_dirs;

pub const LOG_FILE_NAME: &str = "pdfmark.log";

/// Installs the global subscriber: `RUST_LOG`-driven filter (default
/// `info`), a plain-text file layer under `log_dir` and a console layer.
/// Keep the returned guard alive for the lifetime of the host, dropping it
/// flushes the file writer.
pub fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE_NAME);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    let console_layer = tracing_subscriber::fmt::layer();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

/// [`init_logging`] into the platform data directory.
pub fn init_default_logging() -> Result<WorkerGuard> {
    let dirs = project_dirs()?;
    init_logging(&dirs.data_local_dir().join("logs"))
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Logging setup: a non-blocking `tracing-appender` file writer behind a
//! `tracing-subscriber` registry, reusing the teacher's
//! `oj-daemon::main::setup_logging` shape almost verbatim. The core crate
//! itself depends only on the `tracing` facade — this is where a
//! subscriber actually gets installed.

use std::io;
use std::path::Path;

use thiserror::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: std::path::PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("log path has no parent directory or file name: {0}")]
    MalformedPath(std::path::PathBuf),
}

/// Install a global `tracing` subscriber writing to `log_path`, non-blocking.
/// The returned guard must be kept alive for the duration of the process —
/// dropping it stops the background flush thread.
pub fn setup_logging(log_path: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard, LoggingError> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| LoggingError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let dir = log_path.parent().ok_or_else(|| LoggingError::MalformedPath(log_path.to_path_buf()))?;
    let file_name = log_path
        .file_name()
        .ok_or_else(|| LoggingError::MalformedPath(log_path.to_path_buf()))?;

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}

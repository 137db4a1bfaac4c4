//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for a whole process
//! - Write structured logs to the configured file, creating it (and its
//!   parent directories) on first run
//! - Optionally tee to stdout; the client must not, because the TUI owns
//!   the terminal
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the computed default filter
//! - The file layer never emits ANSI escapes

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where and how verbosely a process logs.
#[derive(Debug, Clone)]
pub struct LogOptions {
    pub log_file: PathBuf,
    /// Mirror log lines to stdout in addition to the file.
    pub stdout: bool,
    /// Lower the default level from info to debug.
    pub debug: bool,
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to open log file {path}: {source}")]
    OpenLogFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Initialize the process-wide subscriber. Call once, before any tracing.
pub fn init(options: &LogOptions) -> Result<(), LoggingError> {
    let file = open_log_file(&options.log_file)?;

    let default_level = if options.debug { "bore=debug" } else { "bore=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(Arc::new(file));

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    let result = if options.stdout {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    } else {
        registry.try_init()
    };

    result.map_err(|err| LoggingError::Install(err.to_string()))
}

fn open_log_file(path: &Path) -> Result<std::fs::File, LoggingError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).map_err(|source| LoggingError::OpenLogFile {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggingError::OpenLogFile {
            path: path.to_path_buf(),
            source,
        })
}

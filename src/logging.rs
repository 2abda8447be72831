//! Tracing configuration and log routing.
//!
//! Pipeline events go to stdout through a compact formatter and, when the file can be opened,
//! are appended to a log file as well. `DOCPIPE_LOG_FILE` picks that file; otherwise it is
//! `logs/docpipe.log` relative to the working directory.
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Environment variable overriding the log file location.
pub const LOG_FILE_ENV: &str = "DOCPIPE_LOG_FILE";

/// Default log directory used when [`LOG_FILE_ENV`] is unset.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Default log file name inside [`DEFAULT_LOG_DIR`].
pub const DEFAULT_LOG_FILE: &str = "docpipe.log";

/// Install the global subscriber: `RUST_LOG` filtering (default `info`), compact stdout, and a
/// file layer when one can be opened.
///
/// The writer guard is parked in a static so buffered lines are flushed at exit.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();
    let file_layer = open_log_file(&log_file_path(|key| std::env::var(key).ok())).map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}

/// Where file logs go, given an environment lookup.
pub(crate) fn log_file_path<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    lookup(LOG_FILE_ENV)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR).join(DEFAULT_LOG_FILE))
}

/// Returns `None` when the directory or file cannot be opened; stdout logging continues.
fn open_log_file(path: &std::path::Path) -> Option<NonBlocking> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        if let Err(err) = std::fs::create_dir_all(parent) {
            eprintln!("Failed to create log directory {}: {err}", parent.display());
            return None;
        }
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| eprintln!("Failed to open log file {}: {err}", path.display()))
        .ok()?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}

//! Logging setup.
//!
//! Installs a `tracing` subscriber that writes to a log file and to stderr:
//! - The log file is truncated at the start of each session
//! - Console output is compact and coloured, the file is plain text
//! - Filtering follows `RUST_LOG` and defaults to `info`

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info";

/// Keeps the background log writer alive.
///
/// Dropping it flushes and closes the log file.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
    path: PathBuf,
}

impl LoggingGuard {
    /// Path of the log file being written.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Initialize logging to `log_dir/log_file` and stderr.
///
/// `default_filter` applies when `RUST_LOG` is unset.
///
/// # Errors
///
/// Fails if the directory cannot be created, the file cannot be truncated,
/// or a global subscriber is already installed.
pub fn init_logging(
    log_dir: impl AsRef<Path>,
    log_file: &str,
    default_filter: &str,
) -> Result<LoggingGuard, io::Error> {
    let log_dir = log_dir.as_ref();
    fs::create_dir_all(log_dir)?;

    let path = log_dir.join(log_file);
    fs::write(&path, "")?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .compact();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| io::Error::other(e.to_string()))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
        path,
    })
}

/// Default log directory: `<data dir>/geofix/logs`, or `logs` when the
/// platform has no data directory.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("geofix").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Default log file name.
pub fn default_log_file() -> &'static str {
    "geofix.log"
}

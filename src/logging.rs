//! Process-wide tracing setup.
//!
//! Events go to stderr and to `ami_backup.log` in the configured log
//! directory, rotated daily. `RUST_LOG` overrides the default `info` filter.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// File name prefix of the daily log file.
pub const LOG_FILE_NAME: &str = "ami_backup.log";

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// Raised when the log directory cannot be created.
    #[error("failed to create log directory `{path}`: {message}")]
    LogDir {
        /// Directory that could not be created.
        path: String,
        /// Underlying error message.
        message: String,
    },
    /// Raised when a global subscriber is already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs stderr and daily file logging. The returned guard flushes the
/// file writer on drop and must be held until the process exits.
///
/// # Errors
///
/// Returns [`LoggingError`] when the directory cannot be created or a
/// subscriber is already installed.
pub fn init(log_dir: &Utf8Path) -> Result<WorkerGuard, LoggingError> {
    Dir::create_ambient_dir_all(log_dir, ambient_authority()).map_err(|err| {
        LoggingError::LogDir {
            path: log_dir.to_string(),
            message: err.to_string(),
        }
    })?;

    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()
        .map_err(|err| LoggingError::Install(err.to_string()))?;
    Ok(guard)
}

/// Installs stderr-only logging, used when the log directory is unusable.
///
/// # Errors
///
/// Returns [`LoggingError::Install`] when a subscriber is already installed.
pub fn init_stderr() -> Result<(), LoggingError> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|err| LoggingError::Install(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn unwritable_log_dir_is_reported() {
        let temp = TempDir::new().expect("tempdir");
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, b"x").expect("write blocker");
        let nested = camino::Utf8PathBuf::from_path_buf(blocker.join("logs")).expect("utf8 path");

        let err = init(&nested).expect_err("directory under a file cannot be created");
        assert!(
            matches!(err, LoggingError::LogDir { ref path, .. } if path.ends_with("logs")),
            "unexpected error: {err}"
        );
    }
}

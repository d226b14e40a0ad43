//! Log sinks for the reshard binary.
//!
//! The library only emits `tracing` events. The binary calls [`init`] once
//! with a [`LogConfig`] to route them:
//!
//! - `<dir>/<stem>.info.log` and stdout get INFO and above, unless the info
//!   log is disabled
//! - `<dir>/<stem>.error.log` and stderr always get WARN and above
//!
//! `RUST_LOG` narrows both.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Default log file path.
pub const DEFAULT_LOG_PATH: &str = "reshard.log";

/// Error raised while installing the log subscriber.
#[derive(Error, Debug)]
pub enum LoggingError {
    /// Log directory or file could not be created
    #[error("Failed to open log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A filter directive did not parse
    #[error("Invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    /// A global subscriber was already installed
    #[error("Failed to install log subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Where logs go and whether the info log is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    path: PathBuf,
    info_enabled: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_PATH)
    }
}

impl LogConfig {
    /// Create a config from a base log path such as `logs/reshard.log`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            info_enabled: true,
        }
    }

    /// Enable or disable the info log.
    pub fn with_info_enabled(mut self, enabled: bool) -> Self {
        self.info_enabled = enabled;
        self
    }

    /// Check if the info log is written.
    pub fn info_enabled(&self) -> bool {
        self.info_enabled
    }

    /// Directory holding the log files.
    pub fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// File name up to the first `.`.
    fn stem(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match name.split('.').next() {
            Some(stem) if !stem.is_empty() => stem.to_string(),
            _ => "reshard".to_string(),
        }
    }

    /// Path of the INFO log.
    pub fn info_log_path(&self) -> PathBuf {
        self.dir().join(format!("{}.info.log", self.stem()))
    }

    /// Path of the WARN/ERROR log.
    pub fn error_log_path(&self) -> PathBuf {
        self.dir().join(format!("{}.error.log", self.stem()))
    }
}

fn open_append(path: &Path) -> Result<Arc<File>, LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(Arc::new)
        .map_err(|source| LoggingError::File {
            path: path.to_path_buf(),
            source,
        })
}

/// Directives used when `RUST_LOG` is unset or empty.
const DEFAULT_DIRECTIVES: &str = "valkey_reshard=info,fred=warn";

/// Build the level filter from `RUST_LOG` contents, falling back to
/// [`DEFAULT_DIRECTIVES`]. Directives that are given are used as is.
fn env_filter(rust_log: Option<&str>) -> Result<EnvFilter, LoggingError> {
    let directives = match rust_log.map(str::trim) {
        Some(directives) if !directives.is_empty() => directives,
        _ => DEFAULT_DIRECTIVES,
    };
    Ok(EnvFilter::try_new(directives)?)
}

/// Install the global subscriber.
pub fn init(config: &LogConfig) -> Result<(), LoggingError> {
    fs::create_dir_all(config.dir()).map_err(|source| LoggingError::File {
        path: config.dir().to_path_buf(),
        source,
    })?;

    let filter = env_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref())?;

    let info_layer = if config.info_enabled {
        let file = open_append(&config.info_log_path())?;
        Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(std::io::stdout.and(file))
                .with_filter(LevelFilter::INFO),
        )
    } else {
        None
    };

    let error_file = open_append(&config.error_log_path())?;
    let error_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(std::io::stderr.and(error_file))
        .with_filter(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(filter)
        .with(info_layer)
        .with(error_layer)
        .try_init()?;

    Ok(())
}

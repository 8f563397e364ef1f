//! Structured logging setup
//!
//! Filter precedence: `LOG_LEVEL` when set, otherwise `RUST_LOG`, otherwise
//! `info`. HTTP client and server internals are held at `warn` so request logs
//! stay readable at `info`.
//!
//! Besides stdout, two daily-rotated files are written under
//! `MEMORIGRAPH_LOG_DIR` (default `logs`): `app.*.log` with everything the
//! filter lets through and `errors.*.log` with `ERROR` events only.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

const QUIET_TARGETS: &[&str] = &["hyper=warn", "hyper_util=warn", "reqwest=warn", "h2=warn", "rustls=warn"];

pub const DEFAULT_LOG_DIR: &str = "logs";

/// Rotated files kept per log
const MAX_LOG_FILES: usize = 5;

/// Build the filter directive string for a configured level
pub fn filter_directives(log_level: &str) -> String {
    let level = match log_level.trim().to_lowercase().as_str() {
        "critical" | "fatal" => "error".to_string(),
        "warning" => "warn".to_string(),
        "" => "info".to_string(),
        other => other.to_string(),
    };

    std::iter::once(level.as_str())
        .chain(QUIET_TARGETS.iter().copied())
        .collect::<Vec<_>>()
        .join(",")
}

/// Logging settings read from the environment before anything else starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub log_level: Option<String>,
    pub rust_log: Option<String>,
    /// `None` disables file output
    pub log_dir: Option<PathBuf>,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Empty values count as unset; `MEMORIGRAPH_LOG_DIR=off` turns files off.
    pub fn from_source(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let log_dir = match get("MEMORIGRAPH_LOG_DIR") {
            Some(dir) if matches!(dir.trim().to_lowercase().as_str(), "off" | "none" | "false") => None,
            Some(dir) => Some(PathBuf::from(dir)),
            None => Some(PathBuf::from(DEFAULT_LOG_DIR)),
        };

        Self {
            log_level: get("LOG_LEVEL"),
            rust_log: get("RUST_LOG"),
            log_dir,
        }
    }

    pub fn directives(&self) -> String {
        match (&self.log_level, &self.rust_log) {
            (Some(level), _) => filter_directives(level),
            (None, Some(raw)) => raw.clone(),
            (None, None) => filter_directives("info"),
        }
    }
}

/// Keeps the file writers flushing; drop it only at process exit.
pub struct TracingGuard {
    _workers: Vec<WorkerGuard>,
}

fn rolling_file(dir: &Path, prefix: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(dir)
        .with_context(|| format!("Failed to open {prefix} log in {}", dir.display()))
}

/// Open the all-levels and errors-only appenders in `dir`, creating it.
pub fn open_log_files(dir: &Path) -> Result<(RollingFileAppender, RollingFileAppender)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    Ok((rolling_file(dir, "app")?, rolling_file(dir, "errors")?))
}

/// Initialize the global subscriber. Safe to call more than once; later calls
/// are ignored. A log directory that cannot be opened leaves stdout logging
/// in place and is reported as a warning.
pub fn init_tracing(settings: &LogSettings) -> TracingGuard {
    let directives = settings.directives();
    let mut workers = Vec::new();

    let files = settings.log_dir.as_deref().map(open_log_files);
    let (app_layer, error_layer, file_error) = match files {
        Some(Ok((app, errors))) => {
            let (app_writer, app_guard) = tracing_appender::non_blocking(app);
            let (error_writer, error_guard) = tracing_appender::non_blocking(errors);
            workers.push(app_guard);
            workers.push(error_guard);
            (
                Some(
                    fmt::layer()
                        .with_ansi(false)
                        .with_writer(app_writer)
                        .with_filter(EnvFilter::new(&directives)),
                ),
                Some(
                    fmt::layer()
                        .with_ansi(false)
                        .with_writer(error_writer)
                        .with_filter(LevelFilter::ERROR),
                ),
                None,
            )
        }
        Some(Err(e)) => (None, None, Some(e)),
        None => (None, None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_filter(EnvFilter::new(&directives)))
        .with(app_layer)
        .with(error_layer)
        .try_init();

    if let Some(e) = file_error {
        warn!(error = %format!("{e:#}"), "File logging disabled");
    }

    TracingGuard { _workers: workers }
}

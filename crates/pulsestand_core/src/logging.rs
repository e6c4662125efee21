//! Process-wide logging bootstrap.
//!
//! # Responsibility
//! - Start the rolling file sink once per process.
//! - Capture panics as sanitized `panic_captured` events.
//!
//! # Invariants
//! - Re-initializing with the same level and directory is a no-op.
//! - A different level or directory after the first call is rejected.
//! - Initialization never panics.
//!
//! Every core event uses `event=<name> module=<module> status=<status>`
//! followed by `key=value` metadata. Document bodies and event text are
//! never logged, only their sizes and identifiers.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "pulsestand";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();
static PANIC_HOOK_INSTALLED: OnceCell<()> = OnceCell::new();

struct LoggingState {
    level: &'static str,
    log_dir: PathBuf,
    _logger: LoggerHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    UnsupportedLevel(String),
    InvalidDirectory(String),
    /// Logging is already running with another level or directory.
    Conflict(String),
    Backend(String),
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::InvalidDirectory(message) => write!(f, "invalid log directory: {message}"),
            Self::Conflict(message) => write!(f, "logging already initialized: {message}"),
            Self::Backend(message) => write!(f, "logger backend failure: {message}"),
        }
    }
}

impl Error for LoggingError {}

/// Starts file logging at `level` under `log_dir`.
///
/// # Errors
/// - `UnsupportedLevel` for levels outside `trace|debug|info|warn|error`.
/// - `InvalidDirectory` when `log_dir` is empty, relative or not creatable.
/// - `Conflict` when already started with different settings.
pub fn init_logging(level: &str, log_dir: impl AsRef<Path>) -> Result<(), LoggingError> {
    let level = normalize_level(level)?;
    let log_dir = normalize_log_dir(log_dir.as_ref())?;

    let state = LOGGING_STATE.get_or_try_init(|| start_logger(level, &log_dir))?;
    if state.log_dir != log_dir {
        return Err(LoggingError::Conflict(format!(
            "running at `{}`, refusing `{}`",
            state.log_dir.display(),
            log_dir.display()
        )));
    }
    if state.level != level {
        return Err(LoggingError::Conflict(format!(
            "running with level `{}`, refusing `{level}`",
            state.level
        )));
    }
    Ok(())
}

/// `(level, directory)` of the active sink, if any.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    LOGGING_STATE
        .get()
        .map(|state| (state.level, state.log_dir.clone()))
}

pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_logger(level: &'static str, log_dir: &Path) -> Result<LoggingState, LoggingError> {
    std::fs::create_dir_all(log_dir).map_err(|err| {
        LoggingError::InvalidDirectory(format!("cannot create `{}`: {err}", log_dir.display()))
    })?;

    let logger = Logger::try_with_str(level)
        .map_err(|err| LoggingError::Backend(err.to_string()))?
        .log_to_file(
            FileSpec::default()
                .directory(log_dir)
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| LoggingError::Backend(err.to_string()))?;

    install_panic_hook_once();
    info!(
        "event=core_init module=core status=ok level={} log_dir={} version={}",
        level,
        log_dir.display(),
        env!("CARGO_PKG_VERSION")
    );

    Ok(LoggingState {
        level,
        log_dir: log_dir.to_path_buf(),
        _logger: logger,
    })
}

fn normalize_level(level: &str) -> Result<&'static str, LoggingError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(LoggingError::UnsupportedLevel(other.to_string())),
    }
}

fn normalize_log_dir(log_dir: &Path) -> Result<PathBuf, LoggingError> {
    if log_dir.as_os_str().is_empty() {
        return Err(LoggingError::InvalidDirectory("path is empty".to_string()));
    }
    if !log_dir.is_absolute() {
        return Err(LoggingError::InvalidDirectory(format!(
            "`{}` is not absolute",
            log_dir.display()
        )));
    }
    Ok(log_dir.to_path_buf())
}

fn install_panic_hook_once() {
    if PANIC_HOOK_INSTALLED.set(()).is_err() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = if let Some(message) = panic_info.payload().downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = panic_info.payload().downcast_ref::<String>() {
            message.clone()
        } else {
            "non-string panic payload".to_string()
        };
        error!(
            "event=panic_captured module=core status=error location={} payload={}",
            location,
            sanitize_message(&payload, MAX_PANIC_PAYLOAD_CHARS)
        );
        previous_hook(panic_info);
    }));
}

/// Single-line, length-capped form of untrusted text.
pub(crate) fn sanitize_message(value: &str, max_chars: usize) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated = normalized.chars().take(max_chars).collect::<String>();
    if normalized.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}

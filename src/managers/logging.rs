//! Logging setup
//!
//! stdout carries the JSON result, so every log line goes elsewhere:
//! - Console: stderr, INFO, concise format
//! - File: daily rotated files in the log directory at the configured level

use crate::config::{expand_tilde, GlobalConfig};
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Log file names are `snapshot-rotator.<date>.log`
const LOG_FILE_PREFIX: &str = "snapshot-rotator";
const LOG_FILE_SUFFIX: &str = "log";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_directory: PathBuf,
    /// Level for file output (console always uses INFO)
    pub log_level: Level,
    /// Number of daily files kept
    pub max_files: u32,
}

impl LoggingConfig {
    pub fn from_global(global: &GlobalConfig) -> Self {
        Self {
            log_directory: expand_tilde(&global.log_directory),
            log_level: parse_level(&global.log_level),
            max_files: global.log_max_files,
        }
    }
}

/// Map a config level name to a tracing level, INFO when unrecognised
pub fn parse_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging with console and file outputs
///
/// The returned guard must be kept alive for the duration of the program;
/// dropping it flushes buffered lines to disk.
pub fn init_logging(config: &LoggingConfig) -> Result<LogGuard> {
    fs::create_dir_all(&config.log_directory).with_context(|| {
        format!("Failed to create log directory: {:?}", config.log_directory)
    })?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(config.max_files.max(1) as usize)
        .build(&config.log_directory)
        .context("Failed to create log file appender")?;

    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_filter(level_filter(config.log_level));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(level_filter(Level::INFO));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .init();

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}

/// Console-only logging on stderr, honoring RUST_LOG
pub fn init_console_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// RUST_LOG when set, otherwise everything at `level` and above
fn level_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy()
}

/// Keeps the background log writer alive
pub struct LogGuard {
    _file_guard: WorkerGuard,
}

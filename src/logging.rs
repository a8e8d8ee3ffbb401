//! File logging for credvault.
//!
//! Logs go to timestamped files in ~/.credvault/logs/; files older than the
//! retention window are deleted when logging starts. Passwords, keys and
//! decrypted values are never logged.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Default log retention in hours.
pub const DEFAULT_LOG_RETENTION_HOURS: u32 = 24;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log retention period in hours.
    pub retention_hours: u32,
    /// Log level (trace, debug, info, warn, error, off).
    pub level: String,
    /// Whether logging is enabled.
    pub enabled: bool,
    /// Directory that receives the log files.
    pub directory: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            retention_hours: DEFAULT_LOG_RETENTION_HOURS,
            level: DEFAULT_LOG_LEVEL.to_string(),
            enabled: true,
            directory: log_directory(),
        }
    }
}

impl LogConfig {
    /// Parses log level from string.
    #[must_use]
    pub fn parse_level(value: &str) -> String {
        let level = match value.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" | "warning" => "warn",
            "error" => "error",
            "off" | "none" | "disabled" => "off",
            _ => DEFAULT_LOG_LEVEL,
        };
        level.to_string()
    }

    /// Parses retention hours from string.
    #[must_use]
    pub fn parse_retention(value: &str) -> u32 {
        value.parse().unwrap_or(DEFAULT_LOG_RETENTION_HOURS)
    }

    /// Returns true if nothing should be logged.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        !self.enabled || self.level == "off"
    }
}

/// Returns the default log directory path (~/.credvault/logs/).
#[must_use]
pub fn log_directory() -> PathBuf {
    crate::config::app_directory().join("logs")
}

/// Returns a fresh timestamped log file path inside `dir`.
#[must_use]
pub fn log_file_path(dir: &Path) -> PathBuf {
    let now = chrono::Local::now();
    dir.join(format!("credvault_{}.log", now.format("%Y-%m-%d_%H-%M-%S")))
}

/// Deletes `.log` files in `dir` older than the retention period.
///
/// Returns the number of files deleted. A missing directory is not an error.
pub fn cleanup_old_logs(dir: &Path, retention_hours: u32) -> io::Result<u32> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let retention = Duration::from_secs(u64::from(retention_hours) * 3600);
    let now = SystemTime::now();
    let mut deleted = 0;

    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }

        let expired = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age > retention);

        if expired && fs::remove_file(&path).is_ok() {
            deleted += 1;
        }
    }

    Ok(deleted)
}

/// Initializes file logging.
///
/// `RUST_LOG` overrides the configured level. Returns the log file path, or
/// `None` when logging is disabled.
pub fn init(config: &LogConfig) -> io::Result<Option<PathBuf>> {
    if config.is_disabled() {
        return Ok(None);
    }

    fs::create_dir_all(&config.directory)?;
    let deleted = cleanup_old_logs(&config.directory, config.retention_hours)?;

    let log_path = log_file_path(&config.directory);
    let log_file = File::create(&log_path)?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = fmt::layer()
        .with_writer(log_file.with_max_level(tracing::Level::TRACE))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();

    tracing::info!("credvault {} logging initialized", env!("CARGO_PKG_VERSION"));
    tracing::info!("Log file: {}", log_path.display());
    tracing::debug!(
        "Log level: {}, retention: {} hours",
        config.level,
        config.retention_hours
    );
    if deleted > 0 {
        tracing::info!("Cleaned up {} old log file(s)", deleted);
    }

    Ok(Some(log_path))
}

use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::ConfigError;

pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Where log lines go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    Stdout,
    File(PathBuf),
}

impl FromStr for LogTarget {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(ConfigError::InvalidSetting {
                name: "LOG_FILE",
                message: "must not be empty".to_string(),
            }),
            "stderr" => Ok(LogTarget::Stderr),
            "stdout" => Ok(LogTarget::Stdout),
            path => Ok(LogTarget::File(PathBuf::from(path))),
        }
    }
}

/// Time based rotation of the log file. Ignored for stdout and stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Minutely,
    Hourly,
    Daily,
    Never,
}

impl LogRotation {
    fn to_rotation(self) -> Rotation {
        match self {
            LogRotation::Minutely => Rotation::MINUTELY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

impl FromStr for LogRotation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minutely" => Ok(LogRotation::Minutely),
            "hourly" => Ok(LogRotation::Hourly),
            "daily" => Ok(LogRotation::Daily),
            "never" => Ok(LogRotation::Never),
            other => Err(ConfigError::InvalidSetting {
                name: "LOG_ROTATION",
                message: format!("'{other}' is not one of minutely, hourly, daily, never"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub target: LogTarget,
    /// Filter directive such as `info` or `yagwr=debug`. `RUST_LOG` takes precedence.
    pub level: String,
    pub rotation: LogRotation,
    pub quiet: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            target: LogTarget::Stderr,
            level: DEFAULT_LOG_LEVEL.to_string(),
            rotation: LogRotation::Daily,
            quiet: false,
        }
    }
}

pub struct FileLogger {
    log_directory: PathBuf,
    file_name: String,
    rotation: Rotation,
}

impl FileLogger {
    /// `path` names the log file; rotated files get a date suffix.
    pub fn new(path: &Path) -> Self {
        let log_directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "yagwr.log".to_string());

        Self {
            log_directory,
            file_name,
            rotation: Rotation::DAILY,
        }
    }

    pub fn with_rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation.to_rotation();
        self
    }

    pub fn setup_file_logging(&self) -> Result<(NonBlocking, WorkerGuard), ConfigError> {
        // Ensure log directory exists
        std::fs::create_dir_all(&self.log_directory).map_err(|source| ConfigError::LogDirectory {
            path: self.log_directory.clone(),
            source,
        })?;

        let file_appender = RollingFileAppender::builder()
            .rotation(self.rotation.clone())
            .filename_prefix(&self.file_name)
            .build(&self.log_directory)
            .map_err(|e| ConfigError::InvalidSetting {
                name: "LOG_FILE",
                message: format!(
                    "cannot open '{}': {e}",
                    self.log_directory.join(&self.file_name).display()
                ),
            })?;

        Ok(tracing_appender::non_blocking(file_appender))
    }
}

/// Installs the global subscriber. The returned guard flushes file output and
/// must be held until the process exits.
pub fn setup_logging(settings: &LogSettings) -> Result<Option<WorkerGuard>, ConfigError> {
    if settings.quiet {
        return Ok(None);
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .map_err(|e| ConfigError::InvalidSetting {
            name: "LOG_LEVEL",
            message: e.to_string(),
        })?;

    let (writer, guard, ansi) = match &settings.target {
        LogTarget::Stderr => (BoxMakeWriter::new(std::io::stderr), None, true),
        LogTarget::Stdout => (BoxMakeWriter::new(std::io::stdout), None, true),
        LogTarget::File(path) => {
            let (non_blocking, guard) = FileLogger::new(path)
                .with_rotation(settings.rotation)
                .setup_file_logging()?;
            (BoxMakeWriter::new(non_blocking), Some(guard), false)
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi),
        )
        .init();

    Ok(guard)
}

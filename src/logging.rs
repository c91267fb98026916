use crate::config::{LogFormat, LoggingConfig, RotationStrategy};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Prefix of log file names
pub const LOG_FILE_PREFIX: &str = "realm-agent.log";

/// Log settings
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,
    /// Log directory
    pub log_dir: PathBuf,
    /// File rotation
    pub rotation: LogRotation,
    /// Output format
    pub format: LogFormat,
    /// Console output enabled
    pub console_enabled: bool,
    /// File output enabled
    pub file_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Daily,
    Hourly,
    Never,
}

impl From<RotationStrategy> for LogRotation {
    fn from(strategy: RotationStrategy) -> Self {
        match strategy {
            RotationStrategy::Daily => LogRotation::Daily,
            RotationStrategy::Hourly => LogRotation::Hourly,
            RotationStrategy::Never => LogRotation::Never,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: get_default_log_dir(),
            rotation: LogRotation::Daily,
            format: LogFormat::Pretty,
            console_enabled: true,
            file_enabled: false,
        }
    }
}

impl LogConfig {
    /// Build log settings from the `[logging]` section
    pub fn from_logging_config(config: &LoggingConfig) -> Self {
        Self {
            level: config.level.clone(),
            log_dir: config.directory.clone().unwrap_or_else(get_default_log_dir),
            rotation: config.rotation.into(),
            format: config.format,
            console_enabled: config.console,
            file_enabled: config.file,
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// The filter, `RUST_LOG` taking precedence over the configured level
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Default log directory: `logs` next to the executable, else `./logs`, else the
/// system temp directory
fn get_default_log_dir() -> PathBuf {
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            return exe_dir.join("logs");
        }
    }
    let current = PathBuf::from("logs");
    if current.is_dir() {
        return current;
    }
    std::env::temp_dir().join("realm-agent").join("logs")
}

fn ensure_log_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    }
    Ok(())
}

fn console_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
    match format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

/// Initialize the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held for the life
/// of the process. Calling this twice fails.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let console = config
        .console_enabled
        .then(|| console_layer(config.format));

    let (file, guard) = if config.file_enabled {
        ensure_log_dir(&config.log_dir)?;
        let appender = match config.rotation {
            LogRotation::Daily => rolling::daily(&config.log_dir, LOG_FILE_PREFIX),
            LogRotation::Hourly => rolling::hourly(&config.log_dir, LOG_FILE_PREFIX),
            LogRotation::Never => rolling::never(&config.log_dir, LOG_FILE_PREFIX),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = match config.format {
            LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
            _ => fmt::layer().with_ansi(false).with_writer(writer).boxed(),
        };
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(console)
        .with(file)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    tracing::info!(
        level = %config.level,
        console = config.console_enabled,
        file = config.file_enabled,
        log_dir = %config.log_dir.display(),
        "Logging initialized"
    );

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_logging_config() {
        let dir = tempfile::tempdir().unwrap();
        let section = LoggingConfig {
            level: "debug".to_string(),
            format: LogFormat::Json,
            console: false,
            file: true,
            directory: Some(dir.path().to_path_buf()),
            rotation: RotationStrategy::Hourly,
        };

        let config = LogConfig::from_logging_config(&section);
        assert_eq!(config.level, "debug");
        assert_eq!(config.log_dir, dir.path());
        assert_eq!(config.rotation, LogRotation::Hourly);
        assert!(!config.console_enabled);
        assert!(config.file_enabled);
    }

    #[test]
    fn test_level_override_replaces_configured_level() {
        let config =
            LogConfig::from_logging_config(&LoggingConfig::default()).with_level("realm_agent=trace");
        assert_eq!(config.level, "realm_agent=trace");
        assert_eq!(config.format, LoggingConfig::default().format);
    }

    #[test]
    fn test_ensure_log_dir_creates_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_log_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}

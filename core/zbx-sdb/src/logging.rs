//! Log setup for the item-key adapter.
//!
//! The monitoring agent owns stdout, so logs go to a daily-rolling file next
//! to the executable (or the configured directory). When that directory is
//! unusable, logs fall back to stderr.

use sdb_core::LoggingConfig;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "ZBX_SDB_LOG";
const LOG_FILE_PREFIX: &str = "zbx_sdb";
const LOG_FILE_SUFFIX: &str = "log";
const MAX_LOG_FILES: usize = 5;
const DEFAULT_LEVEL: &str = "info";

/// Installs the global subscriber. Keep the guard alive until exit so
/// buffered lines are flushed.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = build_filter(config);

    match log_dir(config).and_then(|dir| file_appender(&dir)) {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        Err(err) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            tracing::warn!(error = %err, "File logging unavailable, logging to stderr");
            None
        }
    }
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        let level = config.level.as_deref().unwrap_or(DEFAULT_LEVEL);
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
    })
}

fn log_dir(config: &LoggingConfig) -> Result<PathBuf, String> {
    if let Some(dir) = &config.dir {
        return Ok(dir.clone());
    }
    let exe = std::env::current_exe()
        .map_err(|err| format!("Failed to locate executable: {}", err))?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| "Executable has no parent directory".to_string())
}

fn file_appender(dir: &Path) -> Result<RollingFileAppender, String> {
    fs_err::create_dir_all(dir).map_err(|err| err.to_string())?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(MAX_LOG_FILES)
        .build(dir)
        .map_err(|err| format!("Failed to open log file in {}: {}", dir.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_dir_wins_over_executable_dir() {
        let config = LoggingConfig {
            level: None,
            dir: Some(PathBuf::from("/var/log/zbx-sdb")),
        };
        assert_eq!(log_dir(&config).unwrap(), PathBuf::from("/var/log/zbx-sdb"));
    }

    #[test]
    fn appender_creates_missing_directory() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("nested").join("logs");
        assert!(file_appender(&dir).is_ok());
        assert!(dir.is_dir());
    }

    #[test]
    fn appender_fails_when_dir_is_a_file() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        assert!(file_appender(&file).is_err());
    }
}

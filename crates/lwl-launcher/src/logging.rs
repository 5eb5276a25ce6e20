use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Log file written inside the configured logs directory
pub const LOG_FILE_NAME: &str = "lwl.log";

/// Create (or truncate) the log file for this run
pub fn reset_log_file(logs_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(logs_dir)
        .with_context(|| format!("Failed to create logs directory {:?}", logs_dir))?;

    let log_path = logs_dir.join(LOG_FILE_NAME);
    File::create(&log_path).with_context(|| format!("Failed to create log file {:?}", log_path))?;

    Ok(log_path)
}

/// Initialize logging with file and stdout output
///
/// The returned guard flushes the file writer when dropped; keep it alive for
/// the lifetime of the program.
pub fn init_logging(logs_dir: &Path) -> Result<WorkerGuard> {
    let log_path = reset_log_file(logs_dir)?;

    let file_appender = tracing_appender::rolling::never(logs_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_ansi(true)
                .with_target(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    info!("Logs setup at: {:?}", log_path);

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_log_file_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");

        let path = reset_log_file(&logs).unwrap();
        assert_eq!(path, logs.join(LOG_FILE_NAME));

        fs::write(&path, "previous run\n").unwrap();
        reset_log_file(&logs).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }
}

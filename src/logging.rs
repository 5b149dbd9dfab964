//! Logging configuration with journald support on Linux.
//!
//! This module sets up tracing-based logging that integrates with systemd's
//! journal on Linux systems, with file-based fallback for other platforms
//! or when journald is unavailable.

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directory for the file backend.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lazyfood")
        .join("logs")
}

/// Initialize the logging system.
///
/// On Linux, this will attempt to connect to systemd-journald.
/// If unavailable or on other platforms, logs go to a daily file in `log_dir`.
/// With `verbose`, records are mirrored to stderr as well.
///
/// Log level can be controlled via the `LAZYFOOD_LOG` environment variable:
/// - `LAZYFOOD_LOG=debug` for verbose output
/// - `LAZYFOOD_LOG=info` for standard output (default)
/// - `LAZYFOOD_LOG=warn` for warnings and errors only
/// - `LAZYFOOD_LOG=error` for errors only
pub fn init(log_dir: Option<PathBuf>, verbose: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_env("LAZYFOOD_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(target_os = "linux")]
    {
        // Try to use journald on Linux
        if let Ok(journald_layer) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(journald_layer)
                .with(verbose.then(|| fmt::layer().with_writer(std::io::stderr).with_target(false)))
                .try_init()?;

            tracing::debug!("Logging initialized with journald backend");
            return Ok(());
        }
    }

    // Fallback to file-based logging
    let log_dir = log_dir.unwrap_or_else(default_log_dir);

    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "lazyfood.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the worker alive for the whole process; init() runs once at startup.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> = std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(verbose.then(|| fmt::layer().with_writer(std::io::stderr).with_target(false)))
        .try_init()?;

    tracing::debug!("Logging initialized with file backend at {:?}", log_dir);
    Ok(())
}

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{AppConfig, DEFAULT_LOG_FILTER};

const LOG_FILE_PREFIX: &str = "dream-journal";
const LOG_FILE_SUFFIX: &str = "log";

/// Install the global subscriber: JSON lines on stderr plus a daily rolling
/// file under `<data_dir>/logs/`.
///
/// The returned guard flushes the file sink on drop and must be held for
/// the lifetime of the process.
pub fn init(config: &AppConfig) -> anyhow::Result<WorkerGuard> {
    let logs_dir = config.logs_dir();
    std::fs::create_dir_all(&logs_dir)
        .with_context(|| format!("create log directory {}", logs_dir.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .build(&logs_dir)
        .context("initialize rolling log file")?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|err| {
        eprintln!("invalid log filter {:?}: {err}", config.log_filter);
        EnvFilter::new(DEFAULT_LOG_FILTER)
    });

    let stderr_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(std::io::stderr);
    let file_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_ansi(false)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(file_writer);

    // Route `log` records (sqlx) into tracing.
    let _ = tracing_log::LogTracer::init();

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("install global tracing subscriber")?;

    tracing::debug!(target: "dream_journal", event = "logging_ready", dir = %logs_dir.display());
    Ok(guard)
}

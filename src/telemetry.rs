//! Telemetry Module
//!
//! Installs the global tracing subscriber: console output always, plus daily
//! rotated log files when a log directory is configured.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::error::TelemetryError;

/// Rotated log files kept on disk.
pub const MAX_LOG_FILES: usize = 7;

/// Builds the level filter: `RUST_LOG` when set, otherwise `log_level`.
pub fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

/// Initializes logging from configuration.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// lifetime of the process. `None` means console output only.
pub fn init(config: &Config) -> Result<Option<WorkerGuard>, TelemetryError> {
    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("app")
                .filename_suffix("log")
                .max_log_files(MAX_LOG_FILES)
                .build(dir)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(&config.log_level))
        .with(fmt::layer())
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

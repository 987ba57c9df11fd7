//! Tracing setup for the `cw` binary.
//!
//! Human-readable logs go to stderr so stdout stays clean for command output.
//! When a log directory is configured, a JSON copy is also written to a
//! daily-rolling `cardwright.log` there.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the log filter directive.
pub const LOG_FILTER_ENV: &str = "CW_LOG";

/// File name prefix for the rolling log.
pub const LOG_FILE_NAME: &str = "cardwright.log";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held until
/// the process exits. Installing twice is a no-op.
pub fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let mut file_error = None;
    let (file_layer, guard) = match log_dir.map(file_appender) {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        Some(Err(e)) => {
            file_error = Some(e);
            (None, None)
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    if let (Some(dir), Some(e)) = (log_dir, file_error) {
        tracing::warn!(log_dir = %dir.display(), error = %e, "file logging disabled");
    }

    guard
}

fn file_appender(dir: &Path) -> Result<RollingFileAppender, String> {
    std::fs::create_dir_all(dir).map_err(|e| e.to_string())?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_NAME)
        .build(dir)
        .map_err(|e| e.to_string())
}

//! Tracing subscriber setup.
//!
//! Logs always go to stdout. With `logging.file` (or `--log-file`) a second,
//! plain-text layer appends to that file through a non-blocking writer; the
//! returned [`WorkerGuard`] must stay alive until exit or buffered lines are
//! lost.
//!
//! `RUST_LOG` takes precedence over `logging.level` for both layers.

use crate::config::LoggingSection;
use crate::error::ExportError;
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
pub fn init(settings: &LoggingSection) -> Result<Option<WorkerGuard>, ExportError> {
    let stdout_layer = fmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(UtcTime::rfc_3339())
        .with_filter(filter(&settings.level));

    let (file_layer, guard) = match &settings.file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(open_log_file(path)?);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_timer(UtcTime::rfc_3339())
                .with_filter(filter(&settings.level));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();

    if let Some(path) = &settings.file {
        tracing::debug!(path = %path.display(), "Writing logs to file");
    }
    Ok(guard)
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Open `path` for appending, creating it and its parent directories.
fn open_log_file(path: &Path) -> Result<File, ExportError> {
    let io_error = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_error)
}

//! Tracing setup: rotating text and JSON log files plus a compact terminal layer.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log level used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info";

/// Keeps the non-blocking log writers flushing. Drop it only at exit.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _text: WorkerGuard,
    _json: WorkerGuard,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber.
///
/// Writes `moodmap.log` (text) and `moodmap.json.log` (JSON with span context)
/// under `log_dir`, both rotated daily, and mirrors events to stdout.
/// Filtering follows `RUST_LOG`, e.g. `RUST_LOG=rust_moodmap=debug,reqwest=warn`.
pub fn init_logging<P: AsRef<Path>>(log_dir: P) -> Result<LoggingGuard, Box<dyn std::error::Error>> {
    let log_path = log_dir.as_ref();
    std::fs::create_dir_all(log_path)?;

    let text_file_appender = tracing_appender::rolling::daily(log_path, "moodmap.log");
    let (text_writer, text_guard) = tracing_appender::non_blocking(text_file_appender);

    let json_file_appender = tracing_appender::rolling::daily(log_path, "moodmap.json.log");
    let (json_writer, json_guard) = tracing_appender::non_blocking(json_file_appender);

    let text_layer = fmt::layer()
        .with_writer(text_writer)
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true)
        .with_ansi(false)
        .compact()
        .with_filter(env_filter());

    // Span list carries the page URL of the pipeline that logged the event.
    let json_layer = fmt::layer()
        .json()
        .with_writer(json_writer)
        .with_target(true)
        .with_thread_names(true)
        .with_current_span(true)
        .with_span_list(true)
        .with_filter(env_filter());

    let stdout_layer = fmt::layer()
        .with_target(false)
        .compact()
        .with_filter(env_filter());

    tracing_subscriber::registry()
        .with(text_layer)
        .with(json_layer)
        .with(stdout_layer)
        .try_init()?;

    tracing::debug!(log_dir = %log_path.display(), "Logging initialized");

    Ok(LoggingGuard {
        _text: text_guard,
        _json: json_guard,
    })
}

/// Same as [`init_logging`] with logs under `<data_dir>/logs`.
pub fn init_logging_in_data_dir<P: AsRef<Path>>(
    data_dir: P,
) -> Result<LoggingGuard, Box<dyn std::error::Error>> {
    init_logging(data_dir.as_ref().join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_logging_initialization() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("data");

        // Other tests may have installed a subscriber already; the directory is
        // created either way.
        let _ = init_logging_in_data_dir(&data_dir);
        assert!(data_dir.join("logs").is_dir());
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}

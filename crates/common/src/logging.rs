//! Tracing subscriber bootstrap.
//!
//! Builds an `EnvFilter` from the configured level (the `RUST_LOG`
//! environment variable still wins when set), then attaches an optional
//! console layer and an optional file layer. Log-file parent directories
//! are created on demand.

use std::fs;
use std::path::Path;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Initialize the global tracing subscriber.
///
/// Returns the file sink's worker guard when a log file is configured; the
/// caller must keep it alive for the process lifetime or buffered lines are
/// lost on exit. Returns `None` when logging to console only.
///
/// Calling this twice is a no-op for the second caller (the global
/// subscriber can only be installed once); tests rely on that.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let console_layer = config
        .console
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    let mut guard = None;
    let file_layer = if config.file.is_empty() {
        None
    } else {
        let path = Path::new(&config.file);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                // Best effort: a failed create surfaces when the appender opens.
                let _ = fs::create_dir_all(parent);
            }
        }
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = path.file_name().map_or_else(
            || "meeting-server.log".to_string(),
            |name| name.to_string_lossy().into_owned(),
        );
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        guard = Some(file_guard);
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
    };

    let init_result = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    if init_result.is_ok() {
        info!(
            target: "meeting.logging",
            level = %config.level,
            console = config.console,
            file = %config.file,
            "logging initialized"
        );
    }
    guard
}

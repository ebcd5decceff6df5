use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "venue_ingest.log";
const DEFAULT_FILTER: &str = "venue_ingest=info";

/// Initializes the logging system with both console and file output.
///
/// `RUST_LOG` overrides the default `venue_ingest=info` filter. Calling this
/// more than once keeps the first subscriber.
pub fn init_logging() {
    // Ensure logs directory exists
    let _ = fs::create_dir_all(LOG_DIR);

    // Create a non-blocking file appender for daily log rotation
    let file_appender = tracing_appender::rolling::daily(LOG_DIR, LOG_FILE);
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // Create a JSON layer for file logging
    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);

    // Console logs go to stderr; stdout carries command output
    let console_layer = fmt::layer().with_writer(std::io::stderr);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // Set the global default subscriber
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .is_ok();

    if installed {
        // We need to keep the guard alive to ensure logs are flushed on exit
        std::mem::forget(_guard);
    }
}

//! Tracing subscriber setup
//!
//! Shared between the binary and tests. Logs go to a file so they never mix
//! with the terminal stream printed on stdout.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber with file logging.
///
/// Filtering follows `RUST_LOG`, with DEBUG as the default level.
///
/// # Errors
///
/// Fails if the log file cannot be created or a global subscriber is already
/// installed.
pub fn init_global(log_file_path: &Path) -> std::io::Result<()> {
    let log_file = File::create(log_file_path)?;
    build_subscriber(log_file)
        .try_init()
        .map_err(std::io::Error::other)
}

/// Build a subscriber writing formatted events to `log_file`.
pub fn build_subscriber(log_file: File) -> impl tracing::Subscriber + Send + Sync {
    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into());

    let fmt_layer = fmt::layer().with_ansi(false).with_writer(Arc::new(log_file));

    tracing_subscriber::registry().with(fmt_layer).with(env_filter)
}

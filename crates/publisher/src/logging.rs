//! Diagnostic logging setup
//!
//! Installs the global `tracing` subscriber from a [`LogConfig`]. Call once at
//! process start, before constructing the publisher.

use beacon_config::{LogConfig, LogFormat, LogOutput};
use thiserror::Error;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    /// Neither the configured level nor the fallback produced a filter
    #[error("invalid log level: {0}")]
    InvalidFilter(String),

    /// A global subscriber is already installed
    #[error("failed to install log subscriber: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

/// Build the level filter, falling back to `info` on an invalid directive
pub fn filter(config: &LogConfig) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(config.level.as_str())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| LoggingError::InvalidFilter(e.to_string()))
}

/// Install the global subscriber
///
/// # Errors
/// Returns `LoggingError::AlreadyInitialized` if a subscriber is already set
pub fn init(config: &LogConfig) -> Result<(), LoggingError> {
    let filter = filter(config)?;

    let writer = match config.output {
        LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
    };

    let layer = match config.format {
        LogFormat::Console => fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_writer(writer)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()?;

    Ok(())
}

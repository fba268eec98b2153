//! `tracing` setup for binaries and tests that embed the engine.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_LEVEL_VAR: &str = "MPRIS_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No subscriber is installed.
    Silent,
    /// Compact stderr output at `info`.
    Development,
    /// Stderr output at `debug`, with targets and line numbers.
    Debug,
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
}

/// Installs a global subscriber. The level comes from `MPRIS_LOG_LEVEL`,
/// then `RUST_LOG`, then the mode's default.
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    let default_level = match mode {
        LoggingMode::Silent => return Ok(()),
        LoggingMode::Development => "info",
        LoggingMode::Debug => "debug",
    };

    let filter = env_filter(default_level)?;
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(mode == LoggingMode::Debug)
        .with_line_number(mode == LoggingMode::Debug)
        .compact();

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| LoggingError::TracingInit(e.to_string()))
}

fn env_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    let directives = std::env::var(LOG_LEVEL_VAR)
        .or_else(|_| std::env::var(EnvFilter::DEFAULT_ENV))
        .unwrap_or_else(|_| default_level.to_string());

    parse_filter(&directives)
}

fn parse_filter(directives: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(directives)
        .map_err(|e| LoggingError::InvalidFilter(format!("{directives}: {e}")))
}

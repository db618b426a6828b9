//! Structured Logging
//!
//! tracing-subscriber initialization with env-filter support and optional
//! JSON output for log aggregation. Initialize once at startup; the
//! `PAYFLOW_LOG_LEVEL` config value seeds the filter, `RUST_LOG` overrides
//! it per module.

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    Init(String),
}

/// Initialize the global tracing subscriber.
///
/// `level` is the default filter directive (e.g. "info", "payflow=debug");
/// `json` switches to newline-delimited JSON events for production.
pub fn init_logging(level: &str, json: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };

    result.map_err(|e| LoggingError::Init(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent_enough_for_tests() {
        // First call wins; later calls must not panic
        let _ = init_logging("info", false);
        let _ = init_logging("debug", true);
    }
}

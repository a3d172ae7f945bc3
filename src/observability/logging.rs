//! # Structured Logging
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` takes precedence over
//! the configured level so operators can raise verbosity without editing the
//! configuration file.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::config::LoggingConfig;
use crate::core::error::{DiscoveryError, DiscoveryResult};

/// Build the filter from `RUST_LOG`, falling back to the configured level
pub fn build_filter(config: &LoggingConfig) -> DiscoveryResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| DiscoveryError::config(format!("Invalid log level '{}': {}", config.level, e))),
    }
}

/// Initialize the global subscriber
pub fn init_logging(config: &LoggingConfig) -> DiscoveryResult<()> {
    let filter = build_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format.as_str() {
        "pretty" => registry
            .with(fmt::layer().with_target(true).pretty())
            .try_init(),
        _ => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .json(),
            )
            .try_init(),
    };

    result.map_err(|e| DiscoveryError::internal(format!("Failed to initialize logging: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_level_builds_filter() {
        let config = LoggingConfig {
            level: "broker_discovery=debug,tower_http=info".to_string(),
            format: "json".to_string(),
        };
        assert!(build_filter(&config).is_ok());
    }
}

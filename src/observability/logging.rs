//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Pick the filter from `RUST_LOG`, then config, then the built-in default
//!
//! # Design Decisions
//! - JSON output for production, human-readable output for development
//! - Libraries only emit events; installing a subscriber is the binary's job

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

pub const DEFAULT_FILTER: &str = "routekit=debug,tower_http=debug";

/// Resolve the filter directive: `RUST_LOG` wins over the configured level.
pub fn filter_directive(config: &ObservabilityConfig) -> String {
    std::env::var("RUST_LOG")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(
    config: &ObservabilityConfig,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_new(filter_directive(config))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    }
}

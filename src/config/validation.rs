//! Semantic validation of a parsed configuration.
//!
//! # Design Decisions
//! - Every problem is collected; the caller sees all of them at once
//! - Only checks serde cannot express (addresses, ranges, URL shapes)

use std::net::SocketAddr;

use crate::config::schema::AppConfig;

/// One semantic problem, pointing at the offending field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("not a socket address: {}", config.listener.bind_address),
        ));
    }

    if let Some(target) = &config.router.redirect_on_unauthorized {
        if !(target.starts_with('/') || target.starts_with("http")) {
            errors.push(ValidationError::new(
                "router.redirect_on_unauthorized",
                "must be a path starting with '/' or an absolute URL",
            ));
        }
    }
    if config.router.max_body_bytes == 0 {
        errors.push(ValidationError::new("router.max_body_bytes", "must be > 0"));
    }

    let nonzero = [
        ("sse.retention_minutes", config.sse.retention_minutes),
        ("sse.sweep_interval_secs", config.sse.sweep_interval_secs),
        ("sse.subscriber_buffer", config.sse.subscriber_buffer as u64),
        ("client.rpc_timeout_ms", config.client.rpc_timeout_ms),
        ("client.connect_timeout_secs", config.client.connect_timeout_secs),
        ("client.reconnect_delay_secs", config.client.reconnect_delay_secs),
    ];
    for (field, value) in nonzero {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be > 0"));
        }
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "not a socket address: {}",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

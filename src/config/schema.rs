//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for routekit.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::router::RouterSettings;
use crate::sse::SseSettings;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Dispatcher behaviour.
    pub router: RouterConfig,

    /// Server-sent event replay and fan-out.
    pub sse: SseConfig,

    /// Settings for the RPC and stream client.
    pub client: ClientConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Settings handed to a `RouterBuilder`.
    pub fn router_settings(&self) -> RouterSettings {
        RouterSettings {
            development: self.router.mode == Mode::Development,
            max_body_bytes: self.router.max_body_bytes,
            sse: self.sse.settings(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Deployment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Route-shape collision checks and unimplemented-route reports enabled.
    #[default]
    Development,
    Production,
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Mode::Development),
            "production" | "prod" => Ok(Mode::Production),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Development or production.
    pub mode: Mode,

    /// Redirect target for plain authorization failures (instead of 401).
    pub redirect_on_unauthorized: Option<String>,

    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Development,
            redirect_on_unauthorized: None,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Server-sent event configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SseConfig {
    /// How long published batches remain replayable.
    pub retention_minutes: u64,

    /// How often expired batches are evicted.
    pub sweep_interval_secs: u64,

    /// Frames buffered per subscriber before it is dropped.
    pub subscriber_buffer: usize,
}

impl SseConfig {
    pub fn settings(&self) -> SseSettings {
        SseSettings {
            retention: Duration::from_secs(self.retention_minutes * 60),
            subscriber_buffer: self.subscriber_buffer,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            retention_minutes: 5,
            sweep_interval_secs: 60,
            subscriber_buffer: 64,
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// RPC round-trip timeout in milliseconds.
    pub rpc_timeout_ms: u64,

    /// Time allowed for an event stream to open.
    pub connect_timeout_secs: u64,

    /// Delay before reconnecting a dropped event stream.
    pub reconnect_delay_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rpc_timeout_ms: 10_000,
            connect_timeout_secs: 10,
            reconnect_delay_secs: 3,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Filter directive (e.g. "routekit=info"); `RUST_LOG` takes precedence.
    pub log_level: Option<String>,

    /// Emit JSON log lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.router.mode, Mode::Development);
        assert_eq!(config.sse.retention_minutes, 5);
        assert_eq!(config.client.rpc_timeout_ms, 10_000);
    }

    #[test]
    fn test_partial_sections() {
        let config: AppConfig = toml::from_str(
            r#"
            [router]
            mode = "production"
            redirect_on_unauthorized = "/login"

            [sse]
            retention_minutes = 15
            "#,
        )
        .unwrap();
        assert_eq!(config.router.mode, Mode::Production);
        assert_eq!(config.router.redirect_on_unauthorized.as_deref(), Some("/login"));
        assert_eq!(config.sse.retention_minutes, 15);
        assert_eq!(config.sse.sweep_interval_secs, 60);

        let settings = config.router_settings();
        assert!(!settings.development);
        assert_eq!(settings.sse.retention, Duration::from_secs(900));
    }
}

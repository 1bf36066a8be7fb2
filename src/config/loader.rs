//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::{AppConfig, Mode};
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable overriding `router.mode`.
pub const MODE_ENV: &str = "ROUTEKIT_MODE";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid ROUTEKIT_MODE: {0}")]
    Mode(String),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content, std::env::var(MODE_ENV).ok().as_deref())
}

/// Parse, apply the mode override, validate.
pub fn parse_config(content: &str, mode_override: Option<&str>) -> Result<AppConfig, ConfigError> {
    let mut config: AppConfig = toml::from_str(content)?;

    if let Some(mode) = mode_override {
        config.router.mode = mode.parse::<Mode>().map_err(ConfigError::Mode)?;
    }

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read, parse, ROUTEKIT_MODE override)
//!     → validation.rs (semantic checks, all errors collected)
//!     → AppConfig (validated, immutable)
//!     → router_settings() / sse.settings() handed to subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AppConfig, ClientConfig, ListenerConfig, Mode, ObservabilityConfig, RouterConfig, SseConfig,
};
pub use validation::ValidationError;

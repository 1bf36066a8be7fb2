//! Typed routes, a body → auth → handler dispatcher, SSE replay and client reconciliation.

pub mod client;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod route;
pub mod router;
pub mod sse;

pub use config::schema::AppConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use route::{Route, RouteError, TemplateError};
pub use router::{ApiSpec, Router, RouterBuilder, SseSpec};
pub use sse::SseChannel;

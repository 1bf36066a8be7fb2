//! HTTP hosting subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum, request ID, trace span)
//!     → fallback: Router::run
//!         → Matched: endpoint pipeline produces the response
//!         → Unmatched: 404
//!     → Send to client
//! ```

pub mod server;

pub use server::{AppState, HttpServer};

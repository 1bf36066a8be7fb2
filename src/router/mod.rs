//! Request router and dispatcher.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     RouterBuilder::{page, api, custom, server_sent_events}
//!     → shape collision check (development only)
//!     → build() → Router (frozen)
//!
//! Per request:
//!     Router::run(opts, request)
//!     → first endpoint whose method and route match
//!     → body.rs (read + decode)        ─ 400 on failure
//!     → authorization function         ─ 401 / 302 / explicit status / 500
//!     → handler                        ─ error code or 500 on failure
//!     → respond.rs (JSON, HTML, event stream, plain text)
//!     → Dispatch::Unmatched if nothing matched (caller answers 404)
//! ```
//!
//! # Design Decisions
//! - Registration order is match order; no priorities, no backtracking
//! - Authorization refusals are values, not errors
//! - Every failure response is `text/plain`

pub mod auth;
pub mod body;
pub mod dispatch;
pub mod error;
pub mod respond;
pub mod spec;

pub use auth::{allow, AuthFailure, AuthOutcome};
pub use body::{BodyCodec, Json, NoBody};
pub use dispatch::{Call, Dispatch, RequestHead, Router, RouterBuilder, RouterSettings, RunOptions};
pub use error::{BodyError, BoxError, HandlerError, HttpError, RegistrationError};
pub use spec::{ApiSpec, Declared, Page, Returns, SpecInfo, SseSpec, Tag};

//! Typed URL templates.
//!
//! # Data Flow
//! ```text
//! Template string ("/users/{id:number}?{page:number}")
//!     → template.rs (tokenize, resolve codecs)
//!     → Route<P> (immutable, cheap to clone)
//!
//! Incoming path ──parse──► Params ──serde──► P
//! P ──serde──► Params ──link──► URL string
//! ```
//!
//! # Design Decisions
//! - Templates compiled once at startup; compile errors abort startup
//! - Parsing never allocates regexes; only compilation uses one
//! - Codecs are pure, so parse/link are deterministic
//! - Typed params go through `serde_json` so user types stay plain structs

pub mod codec;
pub mod template;

pub use codec::{Codec, CodecError, CodecMap, JsonCodec, SharedCodec, SumCodec, WireType};
pub use template::{
    to_params, Capture, NoParams, Params, Part, Route, RouteError, RouteShape, ShapeSegment,
    TemplateError,
};

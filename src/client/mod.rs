//! Client side: typed RPC, SSE subscriptions and collection reconciliation.
//!
//! # Data Flow
//! ```text
//! RpcClient::call(ApiSpec, params, body)
//!     → link route → encode body → HTTP → decode by content type
//!
//! connect_stream_with_initial_load
//!     → stream.rs opens the SSE link (reconnects with last id)
//!     → rpc.rs loads the full collection
//!     → watch.rs orders and folds each batch into the collection
//!     → watch channel publishes the new list
//! ```

pub mod decoder;
pub mod remote;
pub mod rpc;
pub mod stream;
pub mod watch;

pub use decoder::{EventDecoder, Message};
pub use remote::{rpc_into_remote, Remote};
pub use rpc::{RpcClient, RpcError};
pub use stream::{
    connect, connect_dont_wait, connect_stream_into_remote, connect_stream_with_initial_load,
    sse_url, BatchObserver, ConnectionState, EventStream, LiveCollection, RemoteCollection,
    StreamError, StreamOptions,
};
pub use watch::{
    apply_watch_events, order_watch_events, process_watch_event_with_id, Identified, WatchEvent,
};

//! Server-sent event broadcast with replay.
//!
//! # Data Flow
//! ```text
//! Producer task
//!     → SseChannel::new_item(batch)
//!     → cache.rs (assign id, append to replay log)
//!     → per subscription: filter → frame.rs → mpsc sink
//!     → stream_body() → client connection
//!
//! Subscriber connects (Last-Event-ID or ?last-event-id=)
//!     → cache.rs decides: handshake | replay newer | replay all | nothing
//!     → opening chunk written, subscription registered
//!
//! Maintenance task (every sweep interval)
//!     → evict entries older than the retention window
//!     → on shutdown: disconnect every subscriber
//! ```
//!
//! # Design Decisions
//! - One channel per registered SSE route, created at registration time
//! - Cache, id counter and subscriptions live under one mutex
//! - A disconnect is only noticed when a write fails; stalled sinks are dropped too
//! - Maintenance is a separate task tied to the shutdown coordinator

pub mod cache;
pub mod channel;
pub mod frame;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

pub use cache::{CacheEntry, Replay, ReplayCache};
pub use channel::{stream_body, Filter, SseChannel, SseEndpoint, SseSettings};

/// Periodically evict expired batches from every channel. On shutdown,
/// disconnect all subscribers so their streams end.
pub async fn run_maintenance(
    channels: Vec<Arc<dyn SseEndpoint>>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    if channels.is_empty() {
        return;
    }
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = chrono::Utc::now();
                for channel in &channels {
                    let evicted = channel.sweep_expired(now);
                    if evicted > 0 {
                        tracing::debug!(route = %channel.route(), evicted, "Swept SSE replay cache");
                    }
                }
            }
            _ = shutdown.recv() => {
                for channel in &channels {
                    let dropped = channel.disconnect_all();
                    tracing::debug!(route = %channel.route(), dropped, "Closed SSE subscribers");
                }
                break;
            }
        }
    }
}

//! Live fan-out plus replay for one SSE endpoint.

use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::observability::metrics;
use crate::router::respond;
use crate::sse::cache::{CacheEntry, Replay, ReplayCache};
use crate::sse::frame;

/// Decides whether a subscription with params `P` wants item `I`.
pub type Filter<P, I> = Arc<dyn Fn(&P, &I) -> bool + Send + Sync>;

/// Per-channel tuning.
#[derive(Debug, Clone)]
pub struct SseSettings {
    /// How long published batches stay replayable.
    pub retention: Duration,
    /// Frames buffered per subscriber before it counts as stalled.
    pub subscriber_buffer: usize,
}

impl Default for SseSettings {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(5 * 60),
            subscriber_buffer: 64,
        }
    }
}

struct Subscription<P> {
    params: P,
    sink: mpsc::Sender<Bytes>,
}

struct State<P, I> {
    cache: ReplayCache<I>,
    subscriptions: Vec<Subscription<P>>,
}

/// Broadcast hub for one registered SSE route.
///
/// Publishing and subscribing take the same lock, so a subscriber either sees
/// a batch in its replay or receives it live, never both and never neither.
pub struct SseChannel<P, I> {
    route: String,
    state: Mutex<State<P, I>>,
    filter: Filter<P, I>,
    buffer: usize,
}

impl<P, I> SseChannel<P, I>
where
    P: Send + 'static,
    I: Serialize + Send + Sync + 'static,
{
    pub fn new<F>(route: impl Into<String>, settings: &SseSettings, filter: F) -> Self
    where
        F: Fn(&P, &I) -> bool + Send + Sync + 'static,
    {
        Self {
            route: route.into(),
            state: Mutex::new(State {
                cache: ReplayCache::new(settings.retention),
                subscriptions: Vec::new(),
            }),
            filter: Arc::new(filter),
            buffer: settings.subscriber_buffer.max(1),
        }
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    /// Publish a batch: cache it, then push it to every interested subscriber.
    ///
    /// Subscribers whose sink is closed or full are dropped once the fan-out
    /// loop is done. Returns the batch id.
    pub fn new_item(&self, batch: Vec<I>) -> u64 {
        let mut state = self.state.lock().expect("sse channel mutex poisoned");
        let State {
            cache,
            subscriptions,
        } = &mut *state;
        let entry = cache.push(batch);
        let id = entry.id;

        let mut stale = Vec::new();
        for (index, subscription) in subscriptions.iter().enumerate() {
            let Some(chunk) = self.encode(&subscription.params, entry) else {
                continue;
            };
            if subscription.sink.try_send(chunk).is_err() {
                stale.push(index);
            }
        }
        for index in stale.iter().rev() {
            subscriptions.remove(*index);
        }

        metrics::counter_sse_event(&self.route);
        metrics::gauge_sse_cache(&self.route, cache.len());
        if !stale.is_empty() {
            metrics::gauge_sse_subscribers(&self.route, subscriptions.len());
            tracing::debug!(
                route = %self.route,
                dropped = stale.len(),
                subscribers = subscriptions.len(),
                "Dropped unwritable SSE subscribers"
            );
        }
        tracing::trace!(route = %self.route, event_id = id, "Published SSE batch");
        id
    }

    /// Register a subscriber and return the receiving end of its stream.
    ///
    /// The first chunk holds the preamble and whatever the handshake or
    /// replay calls for.
    pub fn subscribe(&self, params: P, last_event_id: Option<&str>) -> mpsc::Receiver<Bytes> {
        let (sink, receiver) = mpsc::channel(self.buffer);
        let mut state = self.state.lock().expect("sse channel mutex poisoned");

        let mut opening = String::from(frame::PREAMBLE);
        match state.cache.replay_for(last_event_id) {
            Replay::Handshake(id) => opening.push_str(&frame::handshake(id)),
            Replay::Entries(entries) => {
                for entry in entries {
                    if let Some(chunk) = self.encode(&params, entry) {
                        opening.push_str(&String::from_utf8_lossy(&chunk));
                    }
                }
            }
            Replay::Nothing => {}
        }

        // Fresh channel with capacity >= 1: the first send cannot fail.
        let _ = sink.try_send(Bytes::from(opening));
        state.subscriptions.push(Subscription { params, sink });

        metrics::gauge_sse_subscribers(&self.route, state.subscriptions.len());
        tracing::debug!(
            route = %self.route,
            last_event_id = ?last_event_id,
            current_id = state.cache.last_id(),
            subscribers = state.subscriptions.len(),
            "SSE subscriber connected"
        );
        receiver
    }

    /// Subscribe and wrap the stream in a `text/event-stream` response.
    pub fn response(&self, params: P, last_event_id: Option<&str>) -> Response {
        respond::event_stream(stream_body(self.subscribe(params, last_event_id)))
    }

    pub fn last_event_id(&self) -> u64 {
        self.state
            .lock()
            .expect("sse channel mutex poisoned")
            .cache
            .last_id()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state
            .lock()
            .expect("sse channel mutex poisoned")
            .subscriptions
            .len()
    }

    pub fn cached_batches(&self) -> usize {
        self.state
            .lock()
            .expect("sse channel mutex poisoned")
            .cache
            .len()
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.lock().expect("sse channel mutex poisoned");
        let evicted = state.cache.sweep(now);
        metrics::gauge_sse_cache(&self.route, state.cache.len());
        evicted
    }

    /// Frame the part of `entry` this subscriber wants; `None` if nothing.
    fn encode(&self, params: &P, entry: &CacheEntry<I>) -> Option<Bytes> {
        let wanted: Vec<&I> = entry
            .items
            .iter()
            .filter(|item| (self.filter)(params, item))
            .collect();
        if wanted.is_empty() {
            return None;
        }
        match frame::batch(&wanted, entry.id) {
            Ok(text) => Some(Bytes::from(text)),
            Err(error) => {
                tracing::error!(
                    route = %self.route,
                    event_id = entry.id,
                    error = %error,
                    "Failed to encode SSE batch"
                );
                None
            }
        }
    }
}

/// Type-erased view of a channel for background maintenance.
pub trait SseEndpoint: Send + Sync {
    fn route(&self) -> &str;

    /// Evict replay entries older than the retention window.
    fn sweep_expired(&self, now: DateTime<Utc>) -> usize;

    /// Drop every subscription, ending their response streams.
    fn disconnect_all(&self) -> usize;
}

impl<P, I> SseEndpoint for SseChannel<P, I>
where
    P: Send + 'static,
    I: Serialize + Send + Sync + 'static,
{
    fn route(&self) -> &str {
        &self.route
    }

    fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        self.sweep_at(now)
    }

    fn disconnect_all(&self) -> usize {
        let mut state = self.state.lock().expect("sse channel mutex poisoned");
        let dropped = state.subscriptions.len();
        state.subscriptions.clear();
        metrics::gauge_sse_subscribers(&self.route, 0);
        dropped
    }
}

/// Turn a subscriber's receiver into a streaming response body.
pub fn stream_body(receiver: mpsc::Receiver<Bytes>) -> Body {
    let stream = futures_util::stream::unfold(receiver, |mut receiver| async move {
        receiver
            .recv()
            .await
            .map(|chunk| (Ok::<_, Infallible>(chunk), receiver))
    });
    Body::from_stream(stream)
}

//! Reconnecting SSE subscriptions and the initial-load reconciler.
//!
//! # Data Flow
//! ```text
//! connect_dont_wait: GET url (Last-Event-ID) → decode frames
//!     → handshake frame: remember id only
//!     → data frame: remember id, decode JSON, on_batch
//!     → stream ends / errors: wait reconnect_delay, reconnect with last id
//!
//! connect_stream_with_initial_load:
//!     connect (wait for open) → RPC initial load → mark loaded
//!     → each batch: order, fold by identifier, publish, observer
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

use crate::client::decoder::EventDecoder;
use crate::client::remote::Remote;
use crate::client::rpc::{RpcClient, RpcError};
use crate::client::watch::{
    order_watch_events, process_watch_event_with_id, Identified, WatchEvent,
};
use crate::config::ClientConfig;
use crate::lifecycle::Shutdown;
use crate::route::RouteError;
use crate::router::body::{Json, NoBody};
use crate::router::respond::TEXT_EVENT_STREAM;
use crate::router::{ApiSpec, SseSpec};

pub const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";

#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// How long `connect` waits for the first successful open.
    pub connect_timeout: Duration,
    /// Pause between a dropped connection and the next attempt.
    pub reconnect_delay: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(3),
        }
    }
}

impl From<&ClientConfig> for StreamOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            reconnect_delay: Duration::from_secs(config.reconnect_delay_secs),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Failed to build link: {0}")]
    Link(#[from] RouteError),

    #[error("Failed to join link: {0}")]
    Join(#[from] url::ParseError),

    #[error("Failed to connect to eventSource: timeout")]
    Timeout,

    #[error("Failed to connect to eventSource: {0}")]
    Connect(String),

    #[error("Event stream closed before opening")]
    Closed,

    #[error(transparent)]
    InitialLoad(#[from] RpcError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Errored(String),
    Closed,
}

/// Handle to a running subscription. Dropping it closes the stream.
#[derive(Debug)]
pub struct EventStream {
    closer: Shutdown,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl EventStream {
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn close(&self) {
        self.closer.trigger();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    async fn wait_open(&self) -> Result<(), StreamError> {
        let mut state = self.state.clone();
        loop {
            let current = state.borrow_and_update().clone();
            match current {
                ConnectionState::Open => return Ok(()),
                ConnectionState::Errored(message) => return Err(StreamError::Connect(message)),
                ConnectionState::Closed => return Err(StreamError::Closed),
                ConnectionState::Connecting => {}
            }
            if state.changed().await.is_err() {
                return Err(StreamError::Closed);
            }
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.closer.trigger();
    }
}

/// Absolute URL of an SSE endpoint for `params`.
pub fn sse_url<P: Serialize, I>(
    base: &Url,
    spec: &SseSpec<P, I>,
    params: &P,
) -> Result<Url, StreamError> {
    Ok(base.join(&spec.route.link(params)?)?)
}

/// Subscribe to `url` and keep reconnecting until closed.
///
/// Every data frame is decoded as `R` and handed to `on_batch`; frames that
/// fail to decode are logged and skipped.
pub fn connect_dont_wait<R, F>(
    http: &reqwest::Client,
    url: Url,
    options: &StreamOptions,
    on_batch: F,
) -> EventStream
where
    R: DeserializeOwned + Send + 'static,
    F: FnMut(R) + Send + 'static,
{
    let closer = Shutdown::new();
    let closed = closer.subscribe();
    let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

    let task = tokio::spawn(run_stream(
        http.clone(),
        url,
        options.reconnect_delay,
        on_batch,
        state_tx,
        closed,
    ));

    EventStream {
        closer,
        state: state_rx,
        task,
    }
}

/// Like [`connect_dont_wait`] but resolves once the first connection opens.
///
/// An error before the first open, or no open within the connect timeout,
/// closes the stream and fails.
pub async fn connect<R, F>(
    http: &reqwest::Client,
    url: Url,
    options: &StreamOptions,
    on_batch: F,
) -> Result<EventStream, StreamError>
where
    R: DeserializeOwned + Send + 'static,
    F: FnMut(R) + Send + 'static,
{
    let stream = connect_dont_wait(http, url.clone(), options, on_batch);
    match tokio::time::timeout(options.connect_timeout, stream.wait_open()).await {
        Ok(Ok(())) => Ok(stream),
        Ok(Err(e)) => {
            tracing::warn!(url = %url, error = %e, "Event stream failed to open");
            stream.close();
            Err(e)
        }
        Err(_) => {
            tracing::warn!(url = %url, "Event stream open timed out");
            stream.close();
            Err(StreamError::Timeout)
        }
    }
}

async fn run_stream<R, F>(
    http: reqwest::Client,
    url: Url,
    reconnect_delay: Duration,
    mut on_batch: F,
    state: watch::Sender<ConnectionState>,
    mut closed: tokio::sync::broadcast::Receiver<()>,
) where
    R: DeserializeOwned,
    F: FnMut(R),
{
    let mut last_event_id: Option<String> = None;

    loop {
        state.send_replace(ConnectionState::Connecting);
        let mut request = http.get(url.clone()).header(ACCEPT, TEXT_EVENT_STREAM);
        if let Some(id) = &last_event_id {
            request = request.header(LAST_EVENT_ID_HEADER, id.as_str());
        }

        let outcome = tokio::select! {
            response = request.send() => response,
            _ = closed.recv() => break,
        };

        let reason = match outcome {
            Ok(response) if response.status().is_success() => {
                state.send_replace(ConnectionState::Open);
                tracing::debug!(url = %url, last_event_id = ?last_event_id, "Event stream open");

                let mut decoder = EventDecoder::new();
                let mut body = response.bytes_stream();
                loop {
                    let chunk = tokio::select! {
                        chunk = body.next() => chunk,
                        _ = closed.recv() => {
                            state.send_replace(ConnectionState::Closed);
                            return;
                        }
                    };
                    match chunk {
                        Some(Ok(bytes)) => {
                            for message in decoder.push(&bytes) {
                                if message.id.is_some() {
                                    last_event_id = message.id.clone();
                                }
                                if message.is_handshake() {
                                    continue;
                                }
                                match serde_json::from_str::<R>(&message.data) {
                                    Ok(batch) => on_batch(batch),
                                    Err(e) => tracing::error!(
                                        url = %url,
                                        error = %e,
                                        "Failed to decode event stream message"
                                    ),
                                }
                            }
                        }
                        Some(Err(e)) => break e.to_string(),
                        None => break "stream ended".to_string(),
                    }
                }
            }
            Ok(response) => format!("unexpected status {}", response.status()),
            Err(e) => e.to_string(),
        };

        tracing::warn!(url = %url, reason = %reason, "Event stream dropped, reconnecting");
        state.send_replace(ConnectionState::Errored(reason));

        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            _ = closed.recv() => break,
        }
    }

    state.send_replace(ConnectionState::Closed);
}

/// Called after each applied batch with the events in the order they were
/// applied, the old and the new list.
pub type BatchObserver<I> = Box<dyn FnMut(&[WatchEvent<I>], &[I], &[I]) + Send>;

/// A server collection kept in sync by watch events.
#[derive(Debug)]
pub struct LiveCollection<I> {
    source: watch::Receiver<Vec<I>>,
    stream: EventStream,
}

impl<I> LiveCollection<I> {
    pub fn source(&self) -> watch::Receiver<Vec<I>> {
        self.source.clone()
    }

    pub fn close(&self) {
        self.stream.close();
    }

    pub fn state(&self) -> ConnectionState {
        self.stream.state()
    }
}

impl<I: Clone> LiveCollection<I> {
    pub fn current(&self) -> Vec<I> {
        self.source.borrow().clone()
    }
}

/// Open the watch stream, then load the full collection over RPC.
///
/// Batches arriving before the load completes are dropped; afterwards each
/// batch is ordered and folded into the collection by identifier. A failed
/// load closes the stream.
pub async fn connect_stream_with_initial_load<P, I>(
    client: &RpcClient,
    options: &StreamOptions,
    initial: &ApiSpec<P, NoBody, Json<Vec<I>>>,
    stream: &SseSpec<P, WatchEvent<I>>,
    params: &P,
    mut observer: Option<BatchObserver<I>>,
) -> Result<LiveCollection<I>, StreamError>
where
    P: Serialize,
    I: Identified + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let (source_tx, source_rx) = watch::channel(Vec::<I>::new());
    let source_tx = Arc::new(source_tx);
    let loaded = Arc::new(AtomicBool::new(false));

    let on_batch = {
        let source_tx = Arc::clone(&source_tx);
        let loaded = Arc::clone(&loaded);
        move |events: Vec<WatchEvent<I>>| {
            if !loaded.load(Ordering::Acquire) {
                return;
            }
            let ordered = order_watch_events(events);
            let old = source_tx.borrow().clone();
            let new = ordered
                .iter()
                .cloned()
                .fold(old.clone(), process_watch_event_with_id);
            source_tx.send_replace(new.clone());
            if let Some(observer) = observer.as_mut() {
                observer(&ordered, &old, &new);
            }
        }
    };

    let url = sse_url(client.base_url(), stream, params)?;
    let events = connect(client.http(), url, options, on_batch).await?;

    match client.call(initial, params, &()).await {
        Ok(items) => {
            source_tx.send_replace(items);
            loaded.store(true, Ordering::Release);
        }
        Err(e) => {
            tracing::warn!(route = %initial.route.template(), error = %e, "Initial load failed");
            events.close();
            return Err(e.into());
        }
    }

    Ok(LiveCollection {
        source: source_rx,
        stream: events,
    })
}

/// A live collection published as a [`Remote`] while it connects.
#[derive(Debug)]
pub struct RemoteCollection<I> {
    remote: watch::Receiver<Remote<watch::Receiver<Vec<I>>>>,
    closer: Shutdown,
}

impl<I> RemoteCollection<I> {
    pub fn remote(&self) -> watch::Receiver<Remote<watch::Receiver<Vec<I>>>> {
        self.remote.clone()
    }

    pub fn close(&self) {
        self.closer.trigger();
    }
}

impl<I> Drop for RemoteCollection<I> {
    fn drop(&mut self) {
        self.closer.trigger();
    }
}

/// Run [`connect_stream_with_initial_load`] in the background, reporting
/// `Initial`, then `Loaded(source)` or `Error(message)`.
pub fn connect_stream_into_remote<P, I>(
    client: RpcClient,
    options: StreamOptions,
    initial: ApiSpec<P, NoBody, Json<Vec<I>>>,
    stream: SseSpec<P, WatchEvent<I>>,
    params: P,
) -> RemoteCollection<I>
where
    P: Serialize + Send + Sync + 'static,
    I: Identified + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let (remote_tx, remote_rx) = watch::channel(Remote::Initial);
    let closer = Shutdown::new();
    let closed = closer.wait();

    tokio::spawn(async move {
        tokio::pin!(closed);
        let connecting =
            connect_stream_with_initial_load(&client, &options, &initial, &stream, &params, None);
        let live = tokio::select! {
            result = connecting => result,
            _ = &mut closed => return,
        };
        match live {
            Ok(live) => {
                remote_tx.send_replace(Remote::Loaded(live.source()));
                tokio::select! {
                    _ = remote_tx.closed() => {}
                    _ = &mut closed => {}
                }
                live.close();
            }
            Err(e) => {
                remote_tx.send_replace(Remote::Error(e.to_string()));
            }
        }
    });

    RemoteCollection {
        remote: remote_rx,
        closer,
    }
}

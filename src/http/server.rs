//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum app with the dispatcher as its fallback service
//! - Wire up middleware (tracing, request ID)
//! - Answer 404 when no registered endpoint matches
//! - Run SSE maintenance alongside the listener
//! - Shut down gracefully on the coordinator's signal

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::router::{Dispatch, Router, RunOptions};
use crate::sse;

/// Application state injected into the fallback handler.
pub struct AppState<C> {
    pub router: Arc<Router<C>>,
    pub options: Arc<RunOptions>,
}

impl<C> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            router: self.router.clone(),
            options: self.options.clone(),
        }
    }
}

/// HTTP server hosting one frozen [`Router`].
pub struct HttpServer<C> {
    app: axum::Router,
    router: Arc<Router<C>>,
    sweep_interval: Duration,
}

impl<C> HttpServer<C>
where
    C: Send + Sync + 'static,
{
    /// Create a new HTTP server with the given configuration.
    pub fn new(router: Router<C>, config: &AppConfig) -> Self {
        let options = RunOptions {
            redirect_on_unauthorized_page: config.router.redirect_on_unauthorized.clone(),
        };
        Self::with_options(router, options, config.sse.sweep_interval())
    }

    pub fn with_options(router: Router<C>, options: RunOptions, sweep_interval: Duration) -> Self {
        let router = Arc::new(router);
        let state = AppState {
            router: router.clone(),
            options: Arc::new(options),
        };
        Self {
            app: Self::build_app(state),
            router,
            sweep_interval,
        }
    }

    /// Build the Axum app with all middleware layers.
    fn build_app(state: AppState<C>) -> axum::Router {
        axum::Router::new()
            .fallback(dispatch::<C>)
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The Axum app, for embedding or in-process tests.
    pub fn app(&self) -> axum::Router {
        self.app.clone()
    }

    /// Run the server on `listener` until `shutdown` triggers.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            endpoints = self.router.specs().count(),
            "HTTP server starting"
        );

        let maintenance = tokio::spawn(sse::run_maintenance(
            self.router.sse_channels(),
            self.sweep_interval,
            shutdown.subscribe(),
        ));

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        if let Err(e) = maintenance.await {
            tracing::warn!(error = %e, "SSE maintenance task ended abnormally");
        }
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Fallback handler: every request goes through the dispatcher.
async fn dispatch<C>(State(state): State<AppState<C>>, request: Request<Body>) -> Response
where
    C: Send + Sync + 'static,
{
    let start = Instant::now();
    match state.router.run(&state.options, request) {
        Dispatch::Matched(pending) => pending.await,
        Dispatch::Unmatched(request) => {
            tracing::debug!(
                method = %request.method(),
                path = %request.uri().path(),
                "No route matched"
            );
            metrics::record_request(request.method().as_str(), "none", 404, start);
            (StatusCode::NOT_FOUND, "Not found").into_response()
        }
    }
}

//! Startup orchestration.
//!
//! # Responsibilities
//! - Install the metrics exporter when enabled
//! - Bind the listener
//! - Hook OS signals to the shutdown coordinator
//! - Serve the frozen router until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The router is built (and validated) before anything binds
//! - Listeners start last (traffic only when ready)

use tokio::net::TcpListener;

use crate::config::AppConfig;
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;
use crate::router::Router;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Serve `router` according to `config` until a signal or `shutdown` fires.
pub async fn serve<C>(
    config: &AppConfig,
    router: Router<C>,
    shutdown: Shutdown,
) -> Result<(), StartupError>
where
    C: Send + Sync + 'static,
{
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .map_err(|source| StartupError::Bind {
            address: config.listener.bind_address.clone(),
            source,
        })?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let signals = signals::spawn_signal_handler(shutdown.clone());
    let server = HttpServer::new(router, config);
    let result = server.run(listener, &shutdown).await;

    shutdown.trigger();
    let _ = signals.await;
    result.map_err(StartupError::from)
}

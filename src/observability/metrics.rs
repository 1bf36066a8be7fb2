//! Metrics collection and exposition.
//!
//! # Metrics
//! - `routekit_requests_total` (counter): dispatched requests by method, route, status
//! - `routekit_request_duration_seconds` (histogram): time to produce a response
//! - `routekit_sse_subscribers` (gauge): live subscribers per SSE route
//! - `routekit_sse_events_total` (counter): batches published per SSE route
//! - `routekit_sse_cache_entries` (gauge): replayable batches per SSE route
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Unmatched requests are recorded under the route label `none`

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with a scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus metrics exporter listening"),
        Err(e) => tracing::warn!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, route: &str, status: u16, start: Instant) {
    metrics::counter!(
        "routekit_requests_total",
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "routekit_request_duration_seconds",
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn gauge_sse_subscribers(route: &str, count: usize) {
    metrics::gauge!("routekit_sse_subscribers", "route" => route.to_string()).set(count as f64);
}

pub fn counter_sse_event(route: &str) {
    metrics::counter!("routekit_sse_events_total", "route" => route.to_string()).increment(1);
}

pub fn gauge_sse_cache(route: &str, entries: usize) {
    metrics::gauge!("routekit_sse_cache_entries", "route" => route.to_string())
        .set(entries as f64);
}

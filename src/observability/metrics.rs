//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define service metrics (requests, latency, admission, background work)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `http_requests_received_total` (counter)
//! - `http_responses_sent_total` (counter): by status
//! - `http_request_duration_seconds` (histogram)
//! - `rate_limit_rejections_total` (counter)
//! - `rate_limit_tracked_clients` (gauge): clients left after a sweep
//! - `background_tasks_total` (counter): by outcome
//! - `background_tasks_outstanding` (gauge)
//!
//! # Design Decisions
//! - Recording without an installed exporter is a no-op
//! - Low-overhead metric updates (atomic operations)

use std::net::SocketAddr;
use std::time::Instant;

use ::metrics::{counter, gauge, histogram};
use axum::{extract::Request, middleware::Next, response::Response};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the global recorder and serve it over HTTP at `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request_received() {
    counter!("http_requests_received_total").increment(1);
}

pub fn record_response(status: u16, start: Instant) {
    counter!("http_responses_sent_total", "status" => status.to_string()).increment(1);
    histogram!("http_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    counter!("rate_limit_rejections_total").increment(1);
}

pub fn set_tracked_clients(count: usize) {
    gauge!("rate_limit_tracked_clients").set(count as f64);
}

pub fn record_background_task(outcome: &'static str) {
    counter!("background_tasks_total", "outcome" => outcome).increment(1);
}

pub fn set_background_tasks_outstanding(count: usize) {
    gauge!("background_tasks_outstanding").set(count as f64);
}

/// Count requests and responses and time the handler chain.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    record_request_received();

    let response = next.run(request).await;

    record_response(response.status().as_u16(), start);
    response
}

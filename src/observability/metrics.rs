//! Metrics collection and exposition.
//!
//! # Metrics
//! - `modhttp_requests_total` (counter): finalized requests by method, status
//! - `modhttp_request_duration_seconds` (histogram): time from accept to close
//! - `modhttp_requests_in_flight` (gauge): requests currently dispatched
//! - `modhttp_failures_total` (counter): failures by tier
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Prometheus exposition is opt-in via configuration

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Failure tier label values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureTier {
    Cancelled,
    Classified,
    Unhandled,
    Transport,
}

impl FailureTier {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureTier::Cancelled => "cancelled",
            FailureTier::Classified => "classified",
            FailureTier::Unhandled => "unhandled",
            FailureTier::Transport => "transport",
        }
    }
}

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finalized request.
pub fn record_request(method: &str, status: u16, elapsed: Duration) {
    ::metrics::counter!(
        "modhttp_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("modhttp_request_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_failure(tier: FailureTier) {
    ::metrics::counter!("modhttp_failures_total", "tier" => tier.as_str()).increment(1);
}

pub fn request_started() {
    ::metrics::gauge!("modhttp_requests_in_flight").increment(1.0);
}

pub fn request_finished() {
    ::metrics::gauge!("modhttp_requests_in_flight").decrement(1.0);
}

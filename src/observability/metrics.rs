//! Metrics collection and exposition.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Initialize metrics exporter and server.
pub fn init_metrics(addr: SocketAddr) {
    if let Err(error) = PrometheusBuilder::new().with_http_listener(addr).install() {
        tracing::error!(%error, "Failed to install Prometheus recorder");
        return;
    }
    tracing::info!("Metrics server listening on http://{}", addr);
}

/// Record one handled proxy request.
pub fn record_request(status: u16, started: Instant) {
    let labels = [("status", status.to_string())];
    counter!("xiino_requests_total", &labels).increment(1);
    histogram!("xiino_request_duration_seconds", &labels)
        .record(started.elapsed().as_secs_f64());
}

/// Record a rate-limited rejection.
pub fn record_rate_limited() {
    counter!("xiino_rate_limited_total").increment(1);
}

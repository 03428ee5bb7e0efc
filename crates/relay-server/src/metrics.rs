//! Prometheus metrics for the relay
//!
//! Labels carry only operation type and outcome, never locations or bodies.
//! Without an installed recorder every call here is a no-op.

use metrics::{counter, gauge, histogram};
use relay_core::{OperationKind, OperationStatus};
use std::net::SocketAddr;
use std::time::Duration;

pub const REJECT_ORIGIN: &str = "origin";
pub const REJECT_METHOD: &str = "method";
pub const REJECT_MALFORMED: &str = "malformed";
pub const REJECT_BODY: &str = "body";

pub fn record_operation(kind: OperationKind, status: OperationStatus, duration: Duration) {
    counter!("relay_operations_total", "op" => kind.as_str(), "outcome" => status.as_str())
        .increment(1);
    histogram!("relay_operation_duration_seconds", "op" => kind.as_str(), "outcome" => status.as_str())
        .record(duration.as_secs_f64());
}

pub fn record_rejected(reason: &'static str) {
    counter!("relay_rejected_total", "reason" => reason).increment(1);
}

pub fn record_connection_start() {
    gauge!("relay_connections_in_flight").increment(1.0);
}

pub fn record_connection_end() {
    gauge!("relay_connections_in_flight").decrement(1.0);
}

/// Install a Prometheus recorder with its own scrape listener on `addr`
pub fn init_prometheus_exporter(addr: SocketAddr) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}

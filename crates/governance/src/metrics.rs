//! Metrics implementation using Prometheus.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use operative_core::{Error, Result};

use crate::circuit_breaker::BreakerState;

/// Initialize Prometheus recorder and return the handle.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    let builder = PrometheusBuilder::new();

    let handle = builder
        .install_recorder()
        .map_err(|e| Error::internal(format!("Failed to install Prometheus recorder: {}", e)))?;

    tracing::info!("Prometheus metrics recorder initialized");
    Ok(handle)
}

/// Track one terminal gate decision (count and latency).
pub fn track_decision(status: &str, action: &str, latency_sec: f64) {
    metrics::counter!(
        "operative_gate_decisions_total",
        "status" => status.to_string(),
        "action" => action.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "operative_gate_duration_seconds",
        "status" => status.to_string()
    )
    .record(latency_sec);
}

/// Track a circuit breaker state change.
pub fn track_circuit_transition(to: BreakerState) {
    metrics::counter!("operative_circuit_transitions_total", "to" => to.as_str()).increment(1);
}

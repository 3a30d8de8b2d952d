//! Prometheus Metrics Module
//!
//! Exposes feed client metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Payloads**: Frames received, decode failures, vehicle records applied
//! - **Connection**: Current status, errors by kind, reconnect attempts
//! - **Fleet**: Number of tracked vehicles
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! before [`init_metrics`] is a no-op.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::connection::ConnectionStatus;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if another global recorder is already installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "fleet_feed_payloads_received_total",
        "Total text frames received from the feed"
    );
    describe_counter!(
        "fleet_feed_decode_failures_total",
        "Total frames discarded because they could not be decoded"
    );
    describe_counter!(
        "fleet_feed_vehicle_updates_total",
        "Total vehicle records applied to the snapshot"
    );
    describe_counter!(
        "fleet_feed_connection_errors_total",
        "Total connection errors by kind"
    );
    describe_counter!(
        "fleet_feed_reconnects_total",
        "Total scheduled reconnection attempts"
    );
    describe_gauge!(
        "fleet_feed_connection_status",
        "Connection status (0 = disconnected, 1 = connecting, 2 = connected)"
    );
    describe_gauge!(
        "fleet_feed_tracked_vehicles",
        "Number of vehicles in the snapshot"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Gauge value for a connection status.
const fn status_value(status: ConnectionStatus) -> f64 {
    match status {
        ConnectionStatus::Disconnected => 0.0,
        ConnectionStatus::Connecting => 1.0,
        ConnectionStatus::Connected => 2.0,
    }
}

/// Record a text frame received from the feed.
pub fn record_payload_received() {
    counter!("fleet_feed_payloads_received_total").increment(1);
}

/// Record a frame that failed to decode.
pub fn record_decode_failure() {
    counter!("fleet_feed_decode_failures_total").increment(1);
}

/// Record vehicle records applied from one frame.
pub fn record_vehicle_updates(count: u64) {
    counter!("fleet_feed_vehicle_updates_total").increment(count);
}

/// Record a connection error.
pub fn record_connection_error(kind: &'static str) {
    counter!("fleet_feed_connection_errors_total", "kind" => kind).increment(1);
}

/// Record a scheduled reconnection attempt.
pub fn record_reconnect() {
    counter!("fleet_feed_reconnects_total").increment(1);
}

/// Update the connection status gauge.
pub fn set_connection_status(status: ConnectionStatus) {
    gauge!("fleet_feed_connection_status").set(status_value(status));
}

/// Update the tracked vehicle gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_tracked_vehicles(count: usize) {
    gauge!("fleet_feed_tracked_vehicles").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_gauge_values() {
        assert!(status_value(ConnectionStatus::Disconnected).abs() < f64::EPSILON);
        assert!((status_value(ConnectionStatus::Connecting) - 1.0).abs() < f64::EPSILON);
        assert!((status_value(ConnectionStatus::Connected) - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_payload_received();
        record_decode_failure();
        record_vehicle_updates(3);
        record_connection_error("transport");
        record_reconnect();
        set_connection_status(ConnectionStatus::Connected);
        set_tracked_vehicles(10);
    }
}

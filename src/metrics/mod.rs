//! Prometheus metrics for the realtime client.
//!
//! Everything is registered in the default registry so an embedding
//! application exposes these alongside its own metrics.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "taskflow_realtime";

lazy_static! {
    /// Handshakes by result ("OK" or an error code)
    pub static ref CONNECT_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_connect_attempts_total", METRIC_PREFIX),
        "Handshake attempts by result",
        &["result"]
    ).unwrap();

    pub static ref RECONNECT_ATTEMPTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_reconnect_attempts_total", METRIC_PREFIX),
        "Reconnect attempts scheduled"
    ).unwrap();

    pub static ref RECONNECT_GIVE_UPS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_reconnect_give_ups_total", METRIC_PREFIX),
        "Times the reconnect policy ran out of attempts"
    ).unwrap();

    /// 1 while a session is connected
    pub static ref CONNECTED: IntGauge = register_int_gauge!(
        format!("{}_connected", METRIC_PREFIX),
        "Whether the realtime connection is up"
    ).unwrap();

    pub static ref FRAMES_SENT_TOTAL: IntCounter = register_int_counter!(
        format!("{}_frames_sent_total", METRIC_PREFIX),
        "Frames written to the transport"
    ).unwrap();

    pub static ref FRAMES_RECEIVED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_frames_received_total", METRIC_PREFIX),
        "Frames read from the transport"
    ).unwrap();

    /// Emits and joins dropped because no session was live or the buffer was full
    pub static ref OUTBOUND_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_outbound_dropped_total", METRIC_PREFIX),
        "Outbound frames dropped while offline"
    ).unwrap();

    pub static ref LISTENER_PANICS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_listener_panics_total", METRIC_PREFIX),
        "Event listeners that panicked"
    ).unwrap();
}

/// Render all registered metrics in the Prometheus text format
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_client_metrics() {
        FRAMES_SENT_TOTAL.inc();
        CONNECT_ATTEMPTS_TOTAL.with_label_values(&["OK"]).inc();

        let output = encode_metrics();
        assert!(output.contains("taskflow_realtime_frames_sent_total"));
        assert!(output.contains("taskflow_realtime_connect_attempts_total"));
    }
}

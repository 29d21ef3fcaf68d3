//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    BRIDGE_TERMINATIONS_TOTAL, BUS_MESSAGES_RECEIVED_TOTAL, BUS_PUBLISHED_TOTAL,
    BUS_PUBLISH_FAILURES_TOTAL, CONNECTIONS_ACTIVE, CONNECTIONS_CLOSED_TOTAL,
    CONNECTIONS_OPENED_TOTAL, CONNECTION_DURATION, EVENTS_BROADCAST_TOTAL,
    LOCAL_DELIVERIES_TOTAL, SLOW_CONSUMER_DROPS_TOTAL, TASK_PANICS_TOTAL,
    UPGRADES_REJECTED_TOTAL, WS_MESSAGES_RECEIVED,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording connection lifecycle metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_opened() {
        CONNECTIONS_OPENED_TOTAL.inc();
        CONNECTIONS_ACTIVE.inc();
    }

    pub fn record_closed(duration_secs: f64) {
        CONNECTIONS_CLOSED_TOTAL.inc();
        CONNECTIONS_ACTIVE.dec();
        CONNECTION_DURATION.observe(duration_secs);
    }

    pub fn record_rejected(reason: &str) {
        UPGRADES_REJECTED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn record_inbound(kind: &str) {
        WS_MESSAGES_RECEIVED.with_label_values(&[kind]).inc();
    }
}

/// Helper struct for recording fan-out metrics
pub struct BroadcastMetrics;

impl BroadcastMetrics {
    pub fn record_event(event_type: &str) {
        EVENTS_BROADCAST_TOTAL.with_label_values(&[event_type]).inc();
    }

    pub fn record_local_delivered(count: u64) {
        LOCAL_DELIVERIES_TOTAL.inc_by(count);
    }

    pub fn record_slow_consumer_drop() {
        SLOW_CONSUMER_DROPS_TOTAL.inc();
    }
}

/// Helper struct for recording distributed bus metrics
pub struct BusMetrics;

impl BusMetrics {
    pub fn record_published() {
        BUS_PUBLISHED_TOTAL.inc();
    }

    pub fn record_publish_failure() {
        BUS_PUBLISH_FAILURES_TOTAL.inc();
    }

    pub fn record_message_received() {
        BUS_MESSAGES_RECEIVED_TOTAL.inc();
    }

    /// `reason` is one of `subscribe_error`, `send_timeout`, `stream_ended`
    pub fn record_bridge_terminated(reason: &str) {
        BRIDGE_TERMINATIONS_TOTAL.with_label_values(&[reason]).inc();
    }
}

/// Helper struct for recording task failures
pub struct TaskMetrics;

impl TaskMetrics {
    pub fn record_panic(task: &str) {
        TASK_PANICS_TOTAL.with_label_values(&[task]).inc();
    }
}

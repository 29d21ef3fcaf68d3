//! Prometheus metrics for the realtime hub.
//!
//! - Connection metrics (active, opened, closed, lifetime)
//! - Fan-out metrics (events broadcast, local deliveries, slow-consumer drops)
//! - Bus metrics (publish failures, messages received, bridge terminations)
//! - Redis health metrics
//! - Task panics

mod helpers;

pub use helpers::{encode_metrics, BroadcastMetrics, BusMetrics, ConnectionMetrics, TaskMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "board_hub";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Number of live WebSocket connections on this instance
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of live WebSocket connections on this instance"
    ).unwrap();

    /// Number of project channels with at least one local connection
    pub static ref CHANNELS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_channels_active", METRIC_PREFIX),
        "Number of channels with at least one local connection"
    ).unwrap();

    pub static ref CONNECTIONS_OPENED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    pub static ref CONNECTIONS_CLOSED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    /// Connection lifetime in seconds
    pub static ref CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection lifetime in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0]
    ).unwrap();

    /// Upgrades rejected before the protocol switch
    pub static ref UPGRADES_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_upgrades_rejected_total", METRIC_PREFIX),
        "WebSocket upgrades rejected before the protocol switch",
        &["reason"]
    ).unwrap();

    /// Inbound frames by kind
    pub static ref WS_MESSAGES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_messages_received_total", METRIC_PREFIX),
        "Inbound WebSocket frames by kind",
        &["kind"]
    ).unwrap();

    // ============================================================================
    // Fan-out Metrics
    // ============================================================================

    /// Events handed to the broadcaster, by event type
    pub static ref EVENTS_BROADCAST_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_broadcast_total", METRIC_PREFIX),
        "Events handed to the broadcaster",
        &["type"]
    ).unwrap();

    /// Frames enqueued by same-process broadcasts
    pub static ref LOCAL_DELIVERIES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_local_deliveries_total", METRIC_PREFIX),
        "Frames enqueued onto local connections by broadcasts"
    ).unwrap();

    /// Connections dropped because their outbound queue was full
    pub static ref SLOW_CONSUMER_DROPS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_slow_consumer_drops_total", METRIC_PREFIX),
        "Connections dropped because their outbound queue was full"
    ).unwrap();

    // ============================================================================
    // Bus Metrics
    // ============================================================================

    pub static ref BUS_PUBLISHED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_bus_published_total", METRIC_PREFIX),
        "Events published to the distributed bus"
    ).unwrap();

    pub static ref BUS_PUBLISH_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_bus_publish_failures_total", METRIC_PREFIX),
        "Failed publishes to the distributed bus"
    ).unwrap();

    pub static ref BUS_MESSAGES_RECEIVED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_bus_messages_received_total", METRIC_PREFIX),
        "Messages received by bridges from the distributed bus"
    ).unwrap();

    /// Bridges that stopped before their connection closed
    pub static ref BRIDGE_TERMINATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_bridge_terminations_total", METRIC_PREFIX),
        "Bridges that stopped while their connection stayed open",
        &["reason"]
    ).unwrap();

    // ============================================================================
    // Redis Metrics
    // ============================================================================

    /// Redis connection status (1 = connected, 0 = disconnected)
    pub static ref REDIS_CONNECTION_STATUS: IntGauge = register_int_gauge!(
        format!("{}_redis_connection_status", METRIC_PREFIX),
        "Redis connection status (1=connected, 0=disconnected)"
    ).unwrap();

    /// Redis circuit breaker state (0=closed, 1=open, 2=half-open)
    pub static ref REDIS_CIRCUIT_BREAKER_STATE: IntGauge = register_int_gauge!(
        format!("{}_redis_circuit_breaker_state", METRIC_PREFIX),
        "Redis circuit breaker state (0=closed, 1=open, 2=half-open)"
    ).unwrap();

    // ============================================================================
    // Task Metrics
    // ============================================================================

    /// Panics caught at a per-connection task boundary
    pub static ref TASK_PANICS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_task_panics_total", METRIC_PREFIX),
        "Panics caught at a per-connection task boundary",
        &["task"]
    ).unwrap();
}

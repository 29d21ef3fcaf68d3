use std::collections::HashMap;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::config::BusBackend;
use crate::hub::BroadcasterStats;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub bus: BusHealth,
}

#[derive(Debug, Serialize)]
pub struct BusHealth {
    pub backend: BusBackend,
    pub healthy: bool,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: ConnectionStats,
    pub broadcasts: BroadcasterStats,
}

#[derive(Debug, Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub unique_users: usize,
    pub channels: HashMap<String, usize>,
}

/// GET /health
///
/// A degraded bus still answers 200: local fan-out keeps working.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let bus_healthy = state.bus.is_healthy();

    Json(HealthResponse {
        status: if bus_healthy { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        bus: BusHealth {
            backend: state.bus.backend(),
            healthy: bus_healthy,
        },
    })
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let registry = state.registry.stats().await;

    Json(StatsResponse {
        connections: ConnectionStats {
            total_connections: registry.total_connections,
            unique_users: registry.unique_users,
            channels: registry.channels,
        },
        broadcasts: state.broadcaster.stats(),
    })
}

use anyhow::Result;
use tokio::net::TcpListener;

use board_realtime_hub::bus::create_event_bus;
use board_realtime_hub::config::Settings;
use board_realtime_hub::server::{create_app, AppState};
use board_realtime_hub::shutdown::{shutdown_signal, GracefulShutdown};
use board_realtime_hub::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new()?;
    let _telemetry = init_telemetry(&settings.log, &settings.otel)?;
    tracing::info!(run_mode = ?std::env::var("RUN_MODE").ok(), "Configuration loaded");

    let bus = create_event_bus(&settings.bus, &settings.redis).await;
    let state = AppState::new(settings.clone(), bus);
    let shutdown = GracefulShutdown::new(
        state.registry.clone(),
        state.shutdown.clone(),
        settings.hub.shutdown_drain_timeout(),
    );
    let root_token = state.shutdown.clone();

    let app = create_app(state);

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        addr = %addr,
        bus_backend = ?settings.bus.backend,
        topic_prefix = %settings.bus.topic_prefix,
        "Server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(root_token))
        .await?;

    let result = shutdown.drain().await;
    if !result.is_clean() {
        tracing::warn!(
            remaining = result.initial_connections - result.connections_closed,
            "Exiting with connections still open"
        );
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::auth::{JwtValidator, TokenValidator};
use crate::bus::EventBus;
use crate::config::Settings;
use crate::hub::{ConnectionRegistry, EventBroadcaster};

/// Shared state handed to every handler.
///
/// `shutdown` is the root of every connection's cancellation token: cancelling
/// it closes all sessions of this instance.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub token_validator: Arc<dyn TokenValidator>,
    pub registry: Arc<ConnectionRegistry>,
    pub bus: Arc<dyn EventBus>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(settings: Settings, bus: Arc<dyn EventBus>) -> Self {
        let token_validator = Arc::new(JwtValidator::new(&settings.jwt));
        Self::with_validator(settings, bus, token_validator)
    }

    pub fn with_validator(
        settings: Settings,
        bus: Arc<dyn EventBus>,
        token_validator: Arc<dyn TokenValidator>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(EventBroadcaster::new(
            registry.clone(),
            bus.clone(),
            settings.bus.topic_prefix.clone(),
        ));

        Self {
            settings: Arc::new(settings),
            token_validator,
            registry,
            bus,
            broadcaster,
            shutdown: CancellationToken::new(),
            started_at: Instant::now(),
        }
    }
}

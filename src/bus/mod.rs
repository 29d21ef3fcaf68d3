//! Cross-instance transport for board events.
//!
//! Every hub process publishes each event on `<prefix><channel_id>` and every
//! connection's bridge subscribes to the topic of its channel, so an event
//! broadcast on one instance reaches clients attached to any other.

mod memory;
mod redis;

pub use self::memory::MemoryBus;
pub use self::redis::RedisBus;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::{BusBackend, BusConfig, RedisConfig};
use crate::redis::{PoolError, RedisPool};

/// Stream of raw payloads delivered on one topic
pub type BusSubscription = BoxStream<'static, Vec<u8>>;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus backend unavailable: {0}")]
    Backend(#[from] PoolError),

    #[error("subscription failed: {0}")]
    Subscribe(String),
}

/// Publish/subscribe transport shared by all hub instances
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Fire-and-forget publish of an already serialized event
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError>;

    /// Subscribe to one topic. Dropping the stream ends the subscription.
    async fn subscribe(&self, topic: &str) -> Result<BusSubscription, BusError>;

    fn backend(&self) -> BusBackend;

    fn is_healthy(&self) -> bool {
        true
    }
}

/// Topic carrying the events of one channel
pub fn channel_topic(prefix: &str, channel_id: &str) -> String {
    format!("{}{}", prefix, channel_id)
}

/// Build the configured bus. A Redis URL that cannot be parsed falls back to
/// the in-memory bus, which only reaches connections of this process.
pub async fn create_event_bus(bus: &BusConfig, redis: &RedisConfig) -> Arc<dyn EventBus> {
    match bus.backend {
        BusBackend::Redis => match RedisPool::new(redis) {
            Ok(pool) => {
                let pool = Arc::new(pool);
                if pool.warm_up().await {
                    tracing::info!(url = %pool.url(), "Using Redis event bus");
                }
                Arc::new(RedisBus::new(pool))
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Invalid Redis configuration, falling back to in-memory event bus"
                );
                Arc::new(MemoryBus::new(bus.memory_buffer_size))
            }
        },
        BusBackend::Memory => {
            tracing::info!(
                buffer_size = bus.memory_buffer_size,
                "Using in-memory event bus, events stay within this process"
            );
            Arc::new(MemoryBus::new(bus.memory_buffer_size))
        }
    }
}

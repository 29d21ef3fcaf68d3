use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;

use crate::config::BusBackend;
use crate::redis::{PoolError, RedisPool};

use super::{BusError, BusSubscription, EventBus};

/// Redis pub/sub bus shared by every hub instance
pub struct RedisBus {
    pool: Arc<RedisPool>,
}

impl RedisBus {
    pub fn new(pool: Arc<RedisPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventBus for RedisBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
        let receivers = self.pool.publish(topic, payload).await?;
        tracing::trace!(topic = %topic, receivers, "Published to Redis");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BusSubscription, BusError> {
        let mut pubsub = self.pool.pubsub().await?;
        pubsub
            .subscribe(topic)
            .await
            .map_err(|e| BusError::Backend(PoolError::Redis(e)))?;

        let topic = topic.to_string();
        let stream = async_stream::stream! {
            let mut messages = pubsub.into_on_message();
            while let Some(message) = messages.next().await {
                yield message.get_payload_bytes().to_vec();
            }
            tracing::debug!(topic = %topic, "Redis subscription closed");
        };

        Ok(stream.boxed())
    }

    fn backend(&self) -> BusBackend {
        BusBackend::Redis
    }

    fn is_healthy(&self) -> bool {
        self.pool.is_healthy()
    }
}

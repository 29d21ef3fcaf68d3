//! Entry point for board events: local fan-out followed by a bus publish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::bus::{channel_topic, EventBus};
use crate::error::AppError;
use crate::event::BoardEvent;
use crate::metrics::{BroadcastMetrics, BusMetrics};

use super::registry::ConnectionRegistry;

/// Result of one broadcast as seen by this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastReport {
    pub local_delivered: usize,
    pub local_dropped: usize,
    /// Whether the bus accepted the event for other instances
    pub published: bool,
}

/// Running totals exposed on `/stats`
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BroadcasterStats {
    pub events: u64,
    pub local_delivered: u64,
    pub local_dropped: u64,
    pub publish_failures: u64,
}

/// Fans a board event out to this process and to the rest of the cluster
pub struct EventBroadcaster {
    registry: Arc<ConnectionRegistry>,
    bus: Arc<dyn EventBus>,
    topic_prefix: String,
    events: AtomicU64,
    local_delivered: AtomicU64,
    local_dropped: AtomicU64,
    publish_failures: AtomicU64,
}

impl EventBroadcaster {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        bus: Arc<dyn EventBus>,
        topic_prefix: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            bus,
            topic_prefix: topic_prefix.into(),
            events: AtomicU64::new(0),
            local_delivered: AtomicU64::new(0),
            local_dropped: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
        }
    }

    /// Serialize once, deliver to local connections, then publish on the bus.
    ///
    /// Only a serialization failure is returned to the caller; a bus failure
    /// is logged and reported as `published: false`.
    #[tracing::instrument(
        name = "hub.broadcast",
        skip(self, event),
        fields(event_type = event.kind(), board_id = %event.board_id())
    )]
    pub async fn broadcast(
        &self,
        channel_id: &str,
        event: &BoardEvent,
    ) -> Result<BroadcastReport, AppError> {
        let frame = event.to_frame()?;

        BroadcastMetrics::record_event(event.kind());
        self.events.fetch_add(1, Ordering::Relaxed);

        let local = self.registry.broadcast(channel_id, frame.clone()).await;
        self.local_delivered
            .fetch_add(local.delivered as u64, Ordering::Relaxed);
        self.local_dropped
            .fetch_add(local.dropped as u64, Ordering::Relaxed);

        let topic = channel_topic(&self.topic_prefix, channel_id);
        let published = match self.bus.publish(&topic, frame.as_bytes()).await {
            Ok(()) => {
                BusMetrics::record_published();
                true
            }
            Err(e) => {
                BusMetrics::record_publish_failure();
                self.publish_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    topic = %topic,
                    error = %e,
                    "Bus publish failed, event delivered to local connections only"
                );
                false
            }
        };

        tracing::debug!(
            delivered = local.delivered,
            dropped = local.dropped,
            published,
            "Event broadcast"
        );

        Ok(BroadcastReport {
            local_delivered: local.delivered,
            local_dropped: local.dropped,
            published,
        })
    }

    pub fn stats(&self) -> BroadcasterStats {
        BroadcasterStats {
            events: self.events.load(Ordering::Relaxed),
            local_delivered: self.local_delivered.load(Ordering::Relaxed),
            local_dropped: self.local_dropped.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusError, BusSubscription, MemoryBus};
    use crate::config::BusBackend;
    use crate::hub::Connection;
    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    struct FailingBus;

    #[async_trait]
    impl EventBus for FailingBus {
        async fn publish(&self, _topic: &str, _payload: &[u8]) -> Result<(), BusError> {
            Err(BusError::Backend(crate::redis::PoolError::CircuitOpen))
        }

        async fn subscribe(&self, _topic: &str) -> Result<BusSubscription, BusError> {
            Err(BusError::Backend(crate::redis::PoolError::CircuitOpen))
        }

        fn backend(&self) -> BusBackend {
            BusBackend::Redis
        }
    }

    #[tokio::test]
    async fn test_local_delivery_and_publish() {
        let root = CancellationToken::new();
        let registry = Arc::new(ConnectionRegistry::new());
        let bus = Arc::new(MemoryBus::default());
        let broadcaster = EventBroadcaster::new(registry.clone(), bus.clone(), "t:");

        let (conn, mut rx) = Connection::open("P1", "u1", 8, &root);
        conn.mark_open();
        registry.register(&conn).await;
        let mut remote = bus.subscribe("t:P1").await.unwrap();

        let event = BoardEvent::moved("B7", json!({"toIndex": 2}));
        let report = broadcaster.broadcast("P1", &event).await.unwrap();

        assert_eq!(
            report,
            BroadcastReport {
                local_delivered: 1,
                local_dropped: 0,
                published: true
            }
        );

        let expected = event.to_frame().unwrap();
        assert_eq!(rx.recv().await.unwrap().to_json().unwrap(), &*expected);
        assert_eq!(remote.next().await.unwrap(), expected.as_bytes().to_vec());
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_fail_broadcast() {
        let root = CancellationToken::new();
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = EventBroadcaster::new(registry.clone(), Arc::new(FailingBus), "t:");

        let (conn, mut rx) = Connection::open("P1", "u1", 8, &root);
        conn.mark_open();
        registry.register(&conn).await;

        let report = broadcaster
            .broadcast("P1", &BoardEvent::deleted("B1", serde_json::Value::Null))
            .await
            .unwrap();

        assert!(!report.published);
        assert_eq!(report.local_delivered, 1);
        assert!(rx.try_recv().is_ok());
        assert_eq!(broadcaster.stats().publish_failures, 1);
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_channel_still_publishes() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster =
            EventBroadcaster::new(registry, Arc::new(MemoryBus::default()), "t:");

        let report = broadcaster
            .broadcast("P9", &BoardEvent::created("B1", json!({})))
            .await
            .unwrap();

        assert_eq!(report.local_delivered, 0);
        assert!(report.published);
        assert_eq!(broadcaster.stats().events, 1);
    }

    #[test]
    fn test_report_wire_format() {
        let report = BroadcastReport {
            local_delivered: 2,
            local_dropped: 1,
            published: true,
        };
        assert_eq!(
            serde_json::to_value(report).unwrap(),
            json!({"localDelivered": 2, "localDropped": 1, "published": true})
        );
    }
}

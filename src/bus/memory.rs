use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::config::BusBackend;

use super::{BusError, BusSubscription, EventBus};

/// Process-local bus: one broadcast channel per topic.
///
/// Used for tests and single-instance deployments. Subscribers that fall more
/// than `buffer_size` messages behind skip the overflow.
pub struct MemoryBus {
    topics: DashMap<String, broadcast::Sender<Vec<u8>>>,
    buffer_size: usize,
}

impl MemoryBus {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            topics: DashMap::new(),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Topics with at least one live subscriber
    pub fn topic_count(&self) -> usize {
        self.topics
            .iter()
            .filter(|entry| entry.value().receiver_count() > 0)
            .count()
    }

    /// Live subscriptions on one topic
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map_or(0, |entry| entry.value().receiver_count())
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
        let Some(sender) = self.topics.get(topic).map(|entry| entry.value().clone()) else {
            return Ok(());
        };

        if sender.send(payload.to_vec()).is_err() {
            // Last subscriber went away
            self.topics
                .remove_if(topic, |_, sender| sender.receiver_count() == 0);
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BusSubscription, BusError> {
        let receiver = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer_size).0)
            .subscribe();

        let topic = topic.to_string();
        let stream = BroadcastStream::new(receiver).filter_map(move |item| {
            let payload = match item {
                Ok(payload) => Some(payload),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = %topic, skipped, "Bus subscriber lagged, messages skipped");
                    None
                }
            };
            futures::future::ready(payload)
        });

        Ok(stream.boxed())
    }

    fn backend(&self) -> BusBackend {
        BusBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let bus = MemoryBus::default();
        let mut a = bus.subscribe("t:P1").await.unwrap();
        let mut b = bus.subscribe("t:P1").await.unwrap();
        assert_eq!(bus.subscriber_count("t:P1"), 2);

        bus.publish("t:P1", b"hello").await.unwrap();

        assert_eq!(a.next().await.unwrap(), b"hello".to_vec());
        assert_eq!(b.next().await.unwrap(), b"hello".to_vec());
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = MemoryBus::default();
        let mut p1 = bus.subscribe("t:P1").await.unwrap();

        bus.publish("t:P2", b"other").await.unwrap();
        bus.publish("t:P1", b"mine").await.unwrap();

        assert_eq!(p1.next().await.unwrap(), b"mine".to_vec());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = MemoryBus::default();
        assert!(bus.publish("t:nobody", b"x").await.is_ok());
        assert_eq!(bus.topic_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_cleaned_up() {
        let bus = MemoryBus::default();
        let sub = bus.subscribe("t:P1").await.unwrap();
        assert_eq!(bus.topic_count(), 1);

        drop(sub);
        bus.publish("t:P1", b"x").await.unwrap();
        assert_eq!(bus.topic_count(), 0);
        assert!(bus.topics.is_empty());
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_overflow() {
        let bus = MemoryBus::new(2);
        let mut sub = bus.subscribe("t:P1").await.unwrap();

        for payload in [b"1", b"2", b"3", b"4"] {
            bus.publish("t:P1", payload).await.unwrap();
        }

        assert_eq!(sub.next().await.unwrap(), b"3".to_vec());
        assert_eq!(sub.next().await.unwrap(), b"4".to_vec());
        let next = tokio::time::timeout(Duration::from_millis(50), sub.next()).await;
        assert!(next.is_err());
    }
}

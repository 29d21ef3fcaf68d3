//! Per-connection forwarding from the distributed bus into the outbound queue.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use crate::bus::EventBus;
use crate::metrics::BusMetrics;
use crate::websocket::OutboundMessage;

use super::connection::{Connection, EnqueueError};

/// Why a bridge stopped forwarding while its connection may still be open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeExit {
    /// The connection closed; normal teardown
    ConnectionClosed,
    SubscribeFailed,
    SendTimeout,
    StreamEnded,
}

impl BridgeExit {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeExit::ConnectionClosed => "connection_closed",
            BridgeExit::SubscribeFailed => "subscribe_error",
            BridgeExit::SendTimeout => "send_timeout",
            BridgeExit::StreamEnded => "stream_ended",
        }
    }
}

/// Forward every bus message on `topic` into the connection's outbound queue.
///
/// Each payload is enqueued with a bounded wait of `send_timeout`. A subscribe
/// error, an expired wait or the end of the subscription stops the bridge
/// only: the connection stays open and keeps receiving same-process events.
#[tracing::instrument(
    name = "ws.bridge",
    skip_all,
    fields(connection_id = %connection.id, topic = %topic)
)]
pub async fn run_bridge(
    bus: Arc<dyn EventBus>,
    connection: Arc<Connection>,
    topic: String,
    send_timeout: Duration,
) -> BridgeExit {
    let exit = forward(bus.as_ref(), &connection, &topic, send_timeout).await;

    if exit != BridgeExit::ConnectionClosed {
        BusMetrics::record_bridge_terminated(exit.as_str());
        tracing::warn!(
            reason = exit.as_str(),
            "Bus bridge stopped, connection continues without cross-instance events"
        );
    }

    exit
}

async fn forward(
    bus: &dyn EventBus,
    connection: &Connection,
    topic: &str,
    send_timeout: Duration,
) -> BridgeExit {
    let subscribed = tokio::select! {
        biased;
        _ = connection.closed() => return BridgeExit::ConnectionClosed,
        subscribed = bus.subscribe(topic) => subscribed,
    };

    let mut messages = match subscribed {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "Bus subscribe failed");
            return BridgeExit::SubscribeFailed;
        }
    };

    loop {
        let payload = tokio::select! {
            biased;
            _ = connection.closed() => return BridgeExit::ConnectionClosed,
            next = messages.next() => match next {
                Some(payload) => payload,
                None => return BridgeExit::StreamEnded,
            },
        };

        BusMetrics::record_message_received();

        let frame: Arc<str> = match String::from_utf8(payload) {
            Ok(text) => Arc::from(text),
            Err(e) => {
                tracing::debug!(error = %e, "Dropping non UTF-8 bus payload");
                continue;
            }
        };

        match connection
            .enqueue_timeout(OutboundMessage::Serialized(frame), send_timeout)
            .await
        {
            Ok(()) => {}
            Err(EnqueueError::Closed) => return BridgeExit::ConnectionClosed,
            Err(EnqueueError::Timeout) | Err(EnqueueError::Full) => {
                return BridgeExit::SendTimeout
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusError, BusSubscription, MemoryBus};
    use crate::config::BusBackend;
    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    struct UnreachableBus;

    #[async_trait]
    impl EventBus for UnreachableBus {
        async fn publish(&self, _topic: &str, _payload: &[u8]) -> Result<(), BusError> {
            Err(BusError::Subscribe("unreachable".into()))
        }

        async fn subscribe(&self, _topic: &str) -> Result<BusSubscription, BusError> {
            Err(BusError::Subscribe("unreachable".into()))
        }

        fn backend(&self) -> BusBackend {
            BusBackend::Redis
        }
    }

    struct FiniteBus;

    #[async_trait]
    impl EventBus for FiniteBus {
        async fn publish(&self, _topic: &str, _payload: &[u8]) -> Result<(), BusError> {
            Ok(())
        }

        async fn subscribe(&self, _topic: &str) -> Result<BusSubscription, BusError> {
            Ok(futures::stream::iter(vec![br#"{"n":1}"#.to_vec()]).boxed())
        }

        fn backend(&self) -> BusBackend {
            BusBackend::Memory
        }
    }

    fn open(
        root: &CancellationToken,
        capacity: usize,
    ) -> (Arc<Connection>, mpsc::Receiver<OutboundMessage>) {
        let (conn, rx) = Connection::open("P1", "u1", capacity, root);
        conn.mark_open();
        (conn, rx)
    }

    async fn wait_for_subscriber(bus: &MemoryBus) {
        while bus.topic_count() == 0 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_forwards_bus_payloads() {
        let root = CancellationToken::new();
        let bus = Arc::new(MemoryBus::default());
        let (conn, mut rx) = open(&root, 8);

        let task = tokio::spawn(run_bridge(
            bus.clone(),
            conn.clone(),
            "t:P1".to_string(),
            Duration::from_secs(1),
        ));
        wait_for_subscriber(&bus).await;

        bus.publish("t:P1", br#"{"type":"BOARD_DELETED","boardId":"B1"}"#)
            .await
            .unwrap();

        let frame = rx.recv().await.unwrap().to_json().unwrap();
        assert_eq!(frame, r#"{"type":"BOARD_DELETED","boardId":"B1"}"#);

        conn.close();
        assert_eq!(task.await.unwrap(), BridgeExit::ConnectionClosed);
    }

    #[tokio::test]
    async fn test_subscribe_error_leaves_connection_open() {
        let root = CancellationToken::new();
        let (conn, _rx) = open(&root, 8);

        let exit = run_bridge(
            Arc::new(UnreachableBus),
            conn.clone(),
            "t:P1".to_string(),
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(exit, BridgeExit::SubscribeFailed);
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn test_stream_end_stops_bridge_only() {
        let root = CancellationToken::new();
        let (conn, mut rx) = open(&root, 8);

        let exit = run_bridge(
            Arc::new(FiniteBus),
            conn.clone(),
            "t:P1".to_string(),
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(exit, BridgeExit::StreamEnded);
        assert_eq!(rx.try_recv().unwrap().to_json().unwrap(), r#"{"n":1}"#);
        assert!(!conn.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_times_out_bridge() {
        let root = CancellationToken::new();
        let bus = Arc::new(MemoryBus::default());
        let (conn, _rx) = open(&root, 1);
        conn.try_enqueue(OutboundMessage::Serialized(Arc::from("{}")))
            .unwrap();

        let task = tokio::spawn(run_bridge(
            bus.clone(),
            conn.clone(),
            "t:P1".to_string(),
            Duration::from_secs(1),
        ));
        wait_for_subscriber(&bus).await;
        bus.publish("t:P1", b"{}").await.unwrap();

        assert_eq!(task.await.unwrap(), BridgeExit::SendTimeout);
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn test_exits_when_connection_closes() {
        let root = CancellationToken::new();
        let bus = Arc::new(MemoryBus::default());
        let (conn, _rx) = open(&root, 8);

        let task = tokio::spawn(run_bridge(
            bus.clone(),
            conn.clone(),
            "t:P1".to_string(),
            Duration::from_secs(1),
        ));
        wait_for_subscriber(&bus).await;
        root.cancel();

        assert_eq!(task.await.unwrap(), BridgeExit::ConnectionClosed);
    }
}

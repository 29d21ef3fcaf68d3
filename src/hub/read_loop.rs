//! Inbound half of a connection: liveness deadline and control frames.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use futures::{Stream, StreamExt};
use tokio::time::Instant;

use crate::metrics::ConnectionMetrics;
use crate::websocket::{ClientMessage, OutboundMessage, ServerMessage};

use super::connection::{Connection, EnqueueError};

/// Consume inbound frames until the peer goes away.
///
/// The read deadline starts at `pong_wait` and is pushed back by every pong.
/// Application pings are answered with a pong on this connection only. The
/// connection is closed when the loop returns, whatever the reason.
#[tracing::instrument(
    name = "ws.read_loop",
    skip_all,
    fields(connection_id = %connection.id, channel_id = %connection.channel_id)
)]
pub async fn read_loop<S, E>(connection: Arc<Connection>, mut stream: S, pong_wait: Duration)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    let _guard = connection.close_guard();
    let mut deadline = Instant::now() + pong_wait;

    loop {
        let next = tokio::select! {
            biased;
            _ = connection.closed() => break,
            next = tokio::time::timeout_at(deadline, stream.next()) => next,
        };

        let message = match next {
            Err(_) => {
                tracing::info!(
                    pong_wait_secs = pong_wait.as_secs(),
                    "Read deadline exceeded, closing connection"
                );
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                tracing::debug!(error = %e, "WebSocket receive error");
                break;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Pong(_) => {
                deadline = Instant::now() + pong_wait;
            }
            Message::Text(text) => handle_text(&connection, text.as_str()),
            Message::Close(_) => {
                tracing::debug!("Received close frame");
                break;
            }
            // Protocol pings are answered by the WebSocket layer
            Message::Ping(_) | Message::Binary(_) => {}
        }
    }
}

fn handle_text(connection: &Connection, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Ping) => {
            ConnectionMetrics::record_inbound("ping");
            match connection.try_enqueue(OutboundMessage::Raw(ServerMessage::Pong)) {
                Ok(()) => {}
                Err(EnqueueError::Full) => {
                    tracing::debug!("Outbound queue full, pong dropped");
                }
                Err(_) => {}
            }
        }
        Err(e) => {
            ConnectionMetrics::record_inbound("ignored");
            tracing::debug!(error = %e, "Ignoring unrecognized client message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use futures::channel::mpsc::{unbounded, UnboundedSender};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    type Inbound = Result<Message, std::io::Error>;

    fn open(root: &CancellationToken) -> (Arc<Connection>, mpsc::Receiver<OutboundMessage>) {
        let (conn, rx) = Connection::open("P1", "u1", 8, root);
        conn.mark_open();
        (conn, rx)
    }

    fn text(tx: &UnboundedSender<Inbound>, body: &str) {
        tx.unbounded_send(Ok(Message::Text(body.into()))).unwrap();
    }

    fn drain(rx: &mut mpsc::Receiver<OutboundMessage>) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(message) = rx.try_recv() {
            frames.push(message.to_json().unwrap());
        }
        frames
    }

    #[tokio::test]
    async fn test_ping_answered_on_same_connection_only() {
        let root = CancellationToken::new();
        let (conn, mut rx) = open(&root);
        let (_other, mut other_rx) = open(&root);
        let (tx, stream) = unbounded::<Inbound>();

        text(&tx, r#"{"type":"ping"}"#);
        drop(tx);
        read_loop(conn.clone(), stream, Duration::from_secs(60)).await;

        assert_eq!(drain(&mut rx), vec![r#"{"type":"pong"}"#.to_string()]);
        assert!(drain(&mut other_rx).is_empty());
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_connection_open() {
        let root = CancellationToken::new();
        let (conn, mut rx) = open(&root);
        let (tx, stream) = unbounded::<Inbound>();

        let task = tokio::spawn(read_loop(conn.clone(), stream, Duration::from_secs(60)));

        text(&tx, "not json at all");
        text(&tx, r#"{"type":"subscribe","channel":"x"}"#);
        text(&tx, r#"{"type":"ping"}"#);

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.to_json().unwrap(), r#"{"type":"pong"}"#);
        assert!(!conn.is_closed());

        drop(tx);
        task.await.unwrap();
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_close_frame_ends_loop() {
        let root = CancellationToken::new();
        let (conn, _rx) = open(&root);
        let (tx, stream) = unbounded::<Inbound>();

        tx.unbounded_send(Ok(Message::Close(None))).unwrap();
        read_loop(conn.clone(), stream, Duration::from_secs(60)).await;

        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_receive_error_ends_loop() {
        let root = CancellationToken::new();
        let (conn, _rx) = open(&root);
        let (tx, stream) = unbounded::<Inbound>();

        tx.unbounded_send(Err(std::io::Error::other("reset"))).unwrap();
        read_loop(conn.clone(), stream, Duration::from_secs(60)).await;

        assert!(conn.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_closed_after_pong_wait() {
        let root = CancellationToken::new();
        let (conn, _rx) = open(&root);
        let (_tx, stream) = unbounded::<Inbound>();

        let started = Instant::now();
        read_loop(conn.clone(), stream, Duration::from_secs(60)).await;

        assert!(started.elapsed() >= Duration::from_secs(60));
        assert!(conn.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_extends_read_deadline() {
        let root = CancellationToken::new();
        let (conn, _rx) = open(&root);
        let (tx, stream) = unbounded::<Inbound>();

        let task = tokio::spawn(read_loop(conn.clone(), stream, Duration::from_secs(60)));

        tokio::time::sleep(Duration::from_secs(40)).await;
        tx.unbounded_send(Ok(Message::Pong(Bytes::new()))).unwrap();
        tokio::time::sleep(Duration::from_secs(40)).await;
        assert!(!conn.is_closed());

        task.await.unwrap();
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_cancellation_stops_loop() {
        let root = CancellationToken::new();
        let (conn, _rx) = open(&root);
        let (_tx, stream) = unbounded::<Inbound>();

        let task = tokio::spawn(read_loop(conn.clone(), stream, Duration::from_secs(60)));
        root.cancel();
        task.await.unwrap();

        assert!(conn.is_closed());
    }
}

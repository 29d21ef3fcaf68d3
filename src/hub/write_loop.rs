//! Outbound half of a connection: the only task that writes to the socket.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::Message;
use futures::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::websocket::OutboundMessage;

use super::connection::Connection;

/// Sole writer of the socket.
///
/// Drains the outbound queue in order and sends a ping every `ping_period`.
/// Each write must finish within `write_wait`. Once the connection starts
/// closing a close frame is sent and the loop returns.
#[tracing::instrument(
    name = "ws.write_loop",
    skip_all,
    fields(connection_id = %connection.id, channel_id = %connection.channel_id)
)]
pub async fn write_loop<S>(
    connection: Arc<Connection>,
    mut sink: S,
    mut queue: mpsc::Receiver<OutboundMessage>,
    ping_period: Duration,
    write_wait: Duration,
) where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let _guard = connection.close_guard();
    let mut ticker = interval_at(Instant::now() + ping_period, ping_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let frame = tokio::select! {
            biased;
            _ = connection.closed() => {
                let _ = write_frame(&mut sink, Message::Close(None), write_wait).await;
                break;
            }
            next = queue.recv() => match next {
                Some(message) => match message.to_json() {
                    Ok(text) => Message::Text(text.into()),
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize outbound message");
                        continue;
                    }
                },
                None => {
                    let _ = write_frame(&mut sink, Message::Close(None), write_wait).await;
                    break;
                }
            },
            _ = ticker.tick() => Message::Ping(Bytes::new()),
        };

        if let Err(reason) = write_frame(&mut sink, frame, write_wait).await {
            tracing::debug!(reason = %reason, "WebSocket write failed, closing connection");
            break;
        }
    }
}

async fn write_frame<S>(sink: &mut S, frame: Message, write_wait: Duration) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    match tokio::time::timeout(write_wait, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("write exceeded {}s", write_wait.as_secs())),
    }
}

//! Connection handle shared by the registry and the per-connection tasks

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::SendTimeoutError, error::TrySendError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::websocket::OutboundMessage;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl From<u8> for ConnectionState {
    fn from(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Why an enqueue onto the outbound queue failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    #[error("outbound queue is full")]
    Full,
    #[error("connection is closed")]
    Closed,
    #[error("timed out waiting for outbound queue capacity")]
    Timeout,
}

/// One live WebSocket connection bound to a project channel.
///
/// The socket itself is owned by the write loop; everything else talks to the
/// connection through its bounded outbound queue. Closing is a one-way switch
/// driven by the cancellation token, which is a child of the server-wide
/// shutdown token.
pub struct Connection {
    pub id: Uuid,
    pub channel_id: String,
    pub user_id: String,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<OutboundMessage>,
    cancel: CancellationToken,
    state: AtomicU8,
}

impl Connection {
    /// Create a connection and the receiving end of its outbound queue
    pub fn open(
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
        queue_capacity: usize,
        parent: &CancellationToken,
    ) -> (Arc<Self>, mpsc::Receiver<OutboundMessage>) {
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let connection = Self {
            id: Uuid::new_v4(),
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            connected_at: Utc::now(),
            sender,
            cancel: parent.child_token(),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
        };
        (Arc::new(connection), receiver)
    }

    /// Time since the connection was accepted
    pub fn age(&self) -> Duration {
        (Utc::now() - self.connected_at).to_std().unwrap_or_default()
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from(self.state.load(Ordering::Acquire))
    }

    /// Connecting -> Open, once the identity is bound and the tasks are about to start
    pub fn mark_open(&self) {
        let _ = self.state.compare_exchange(
            ConnectionState::Connecting as u8,
            ConnectionState::Open as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Final state, after unregistering and joining all tasks
    pub fn mark_closed(&self) {
        self.cancel.cancel();
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
    }

    /// Begin teardown. Returns `true` only for the caller that moved the
    /// connection into `Closing`; later calls are no-ops.
    pub fn close(&self) -> bool {
        let transitioned = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                match ConnectionState::from(current) {
                    ConnectionState::Connecting | ConnectionState::Open => {
                        Some(ConnectionState::Closing as u8)
                    }
                    ConnectionState::Closing | ConnectionState::Closed => None,
                }
            })
            .is_ok();

        self.cancel.cancel();
        transitioned
    }

    /// True once teardown started, including cancellation of the owning context
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the connection starts closing for any reason
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }

    /// Non-blocking enqueue used by broadcasts and liveness replies
    pub fn try_enqueue(&self, message: OutboundMessage) -> Result<(), EnqueueError> {
        if self.is_closed() {
            return Err(EnqueueError::Closed);
        }

        self.sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Enqueue waiting at most `timeout` for capacity
    pub async fn enqueue_timeout(
        &self,
        message: OutboundMessage,
        timeout: Duration,
    ) -> Result<(), EnqueueError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EnqueueError::Closed),
            result = self.sender.send_timeout(message, timeout) => result.map_err(|e| match e {
                SendTimeoutError::Timeout(_) => EnqueueError::Timeout,
                SendTimeoutError::Closed(_) => EnqueueError::Closed,
            }),
        }
    }

    /// Guard that closes the connection when dropped, including on unwind
    pub fn close_guard(self: &Arc<Self>) -> CloseGuard {
        CloseGuard(self.clone())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("channel_id", &self.channel_id)
            .field("user_id", &self.user_id)
            .field("state", &self.state())
            .finish()
    }
}

/// Closes its connection on drop
pub struct CloseGuard(Arc<Connection>);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

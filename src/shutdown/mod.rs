//! Graceful shutdown.
//!
//! 1. A signal (or an explicit cancel) cancels the root token.
//! 2. Every connection token is a child of it, so each session sends a close
//!    frame and unregisters itself.
//! 3. [`GracefulShutdown::drain`] waits, bounded by the drain timeout, for the
//!    registry to empty.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::hub::ConnectionRegistry;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Resolves on SIGINT/SIGTERM or when `token` is cancelled elsewhere, and
/// leaves `token` cancelled either way.
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => tracing::info!("Received terminate signal, initiating graceful shutdown"),
        _ = token.cancelled() => tracing::info!("Shutdown requested"),
    }

    token.cancel();
}

#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Connections registered when shutdown started
    pub initial_connections: usize,
    /// Connections that unregistered before the deadline
    pub connections_closed: usize,
    pub duration: Duration,
}

impl ShutdownResult {
    pub fn is_clean(&self) -> bool {
        self.connections_closed == self.initial_connections
    }
}

pub struct GracefulShutdown {
    registry: Arc<ConnectionRegistry>,
    shutdown: CancellationToken,
    drain_timeout: Duration,
}

impl GracefulShutdown {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        shutdown: CancellationToken,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            shutdown,
            drain_timeout,
        }
    }

    /// Cancel every connection and wait for the registry to drain
    #[tracing::instrument(name = "graceful_shutdown", skip(self))]
    pub async fn drain(&self) -> ShutdownResult {
        let start = Instant::now();
        self.shutdown.cancel();

        let initial = self.registry.connection_count().await;
        if initial > 0 {
            tracing::info!(connections = initial, "Waiting for connections to close");
            let wait = async {
                while self.registry.connection_count().await > 0 {
                    tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
                }
            };
            let _ = tokio::time::timeout(self.drain_timeout, wait).await;
        }

        let remaining = self.registry.connection_count().await;
        if remaining > 0 {
            tracing::warn!(
                remaining_connections = remaining,
                "Some connections did not close before the drain timeout"
            );
        }

        let result = ShutdownResult {
            initial_connections: initial,
            connections_closed: initial.saturating_sub(remaining),
            duration: start.elapsed(),
        };

        tracing::info!(
            connections_closed = result.connections_closed,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }
}

use std::future::Future;
use std::sync::Arc;

use redis::aio::{MultiplexedConnection, PubSub};
use redis::{AsyncCommands, Client, RedisError, RedisResult};
use tokio::sync::RwLock;

use crate::config::RedisConfig;

use super::{
    BackoffConfig, CircuitBreaker, CircuitBreakerConfig, CircuitState, ExponentialBackoff,
    RedisHealth, RedisHealthStatus,
};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("Redis did not answer within {0}ms")]
    Timeout(u64),
}

/// Shared multiplexed connection used for `PUBLISH`.
///
/// The connection is established lazily and dropped again on I/O errors so
/// the next call reconnects. Every outcome is fed to the circuit breaker.
pub struct RedisPool {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    circuit_breaker: CircuitBreaker,
    health: Arc<RedisHealth>,
    config: RedisConfig,
}

impl RedisPool {
    pub fn new(config: &RedisConfig) -> Result<Self, PoolError> {
        let client = Client::open(config.url.as_str())?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
            circuit_breaker: CircuitBreaker::new(CircuitBreakerConfig::from(config)),
            health: Arc::new(RedisHealth::new()),
            config: config.clone(),
        })
    }

    pub async fn get_connection(&self) -> Result<MultiplexedConnection, PoolError> {
        if !self.circuit_breaker.allow_request() {
            self.health.set_circuit_open();
            return Err(PoolError::CircuitOpen);
        }

        if let Some(conn) = self.connection.read().await.as_ref() {
            return Ok(conn.clone());
        }

        self.connect().await
    }

    async fn connect(&self) -> Result<MultiplexedConnection, PoolError> {
        let mut slot = self.connection.write().await;

        // Another task may have connected while we waited for the lock
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        self.health.set_reconnecting();

        let connected = tokio::time::timeout(
            self.config.command_timeout(),
            self.client.get_multiplexed_tokio_connection(),
        )
        .await;

        match connected {
            Ok(Ok(conn)) => {
                *slot = Some(conn.clone());
                self.circuit_breaker.record_success();
                self.health.set_connected();
                tracing::info!(url = %self.config.url, "Redis connection established");
                Ok(conn)
            }
            Ok(Err(e)) => {
                self.circuit_breaker.record_failure();
                tracing::error!(error = %e, "Failed to connect to Redis");
                Err(PoolError::Redis(e))
            }
            Err(_) => {
                self.circuit_breaker.record_failure();
                tracing::error!(
                    timeout_ms = self.config.command_timeout_ms,
                    "Timed out connecting to Redis"
                );
                Err(PoolError::Timeout(self.config.command_timeout_ms))
            }
        }
    }

    /// Run a command on the shared connection with circuit breaker bookkeeping
    pub async fn execute<F, T, Fut>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.get_connection().await?;
        self.guarded(f(conn)).await
    }

    /// Bound one round trip by `command_timeout` and feed the outcome to the breaker.
    /// A hung server counts as a failure and drops the shared connection.
    async fn guarded<T, Fut>(&self, command: Fut) -> Result<T, PoolError>
    where
        Fut: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.config.command_timeout(), command).await {
            Ok(Ok(value)) => {
                self.circuit_breaker.record_success();
                Ok(value)
            }
            Ok(Err(e)) => {
                if e.is_connection_dropped() || e.is_io_error() {
                    self.reset_connection().await;
                }
                self.circuit_breaker.record_failure();
                Err(PoolError::Redis(e))
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.command_timeout_ms,
                    "Redis command timed out"
                );
                self.reset_connection().await;
                self.circuit_breaker.record_failure();
                Err(PoolError::Timeout(self.config.command_timeout_ms))
            }
        }
    }

    async fn reset_connection(&self) {
        *self.connection.write().await = None;
        self.health.set_reconnecting();
    }

    /// `PUBLISH topic payload`, returning the number of receiving subscribers
    pub async fn publish(&self, topic: &str, payload: &[u8]) -> Result<i64, PoolError> {
        self.execute(|mut conn| async move { conn.publish(topic, payload).await })
            .await
    }

    /// Open a dedicated pub/sub connection
    pub async fn pubsub(&self) -> Result<PubSub, PoolError> {
        if !self.circuit_breaker.allow_request() {
            return Err(PoolError::CircuitOpen);
        }

        self.client.get_async_pubsub().await.map_err(|e| {
            self.circuit_breaker.record_failure();
            PoolError::Redis(e)
        })
    }

    pub async fn ping(&self) -> Result<(), PoolError> {
        self.execute(|mut conn| async move {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    /// Try to reach Redis at startup, backing off between attempts.
    /// Returns `false` when every attempt failed; publishing keeps retrying lazily.
    pub async fn warm_up(&self) -> bool {
        let attempts = self.config.connect_attempts.max(1);
        let mut backoff = ExponentialBackoff::new(BackoffConfig::from(&self.config));

        for attempt in 1..=attempts {
            match self.ping().await {
                Ok(()) => return true,
                Err(e) if attempt < attempts => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Redis not reachable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        attempts,
                        error = %e,
                        "Redis not reachable, continuing in degraded mode"
                    );
                }
            }
        }

        false
    }

    pub fn is_healthy(&self) -> bool {
        self.health.is_healthy() && self.circuit_breaker.state() == CircuitState::Closed
    }

    pub fn health_status(&self) -> RedisHealthStatus {
        self.health.status()
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }
}

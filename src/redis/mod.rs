//! Redis connectivity for the distributed bus.
//!
//! Publishing shares one multiplexed connection held by [`RedisPool`], guarded
//! by a [`CircuitBreaker`] so an unreachable server fails fast. Subscriptions
//! each get a dedicated pub/sub connection.

mod backoff;
mod circuit_breaker;
mod health;
mod pool;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use health::{RedisHealth, RedisHealthStatus};
pub use pool::{PoolError, RedisPool};

/// Milliseconds since the Unix epoch
pub(crate) fn current_time_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

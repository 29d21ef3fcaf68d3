use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU8, Ordering};

use crate::config::RedisConfig;
use crate::metrics::REDIS_CIRCUIT_BREAKER_STATE;

use super::current_time_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Requests flow normally
    Closed = 0,
    /// Requests are rejected without touching Redis
    Open = 1,
    /// Trial requests are let through after the reset timeout
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close it again
    pub success_threshold: u32,
    /// Time spent open before trial requests are allowed
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout_ms: 30_000,
        }
    }
}

impl From<&RedisConfig> for CircuitBreakerConfig {
    fn from(config: &RedisConfig) -> Self {
        Self {
            failure_threshold: config.circuit_breaker_failure_threshold.max(1),
            success_threshold: config.circuit_breaker_success_threshold.max(1),
            reset_timeout_ms: config.circuit_breaker_reset_timeout_seconds * 1000,
        }
    }
}

/// Lock-free circuit breaker in front of the publish connection
pub struct CircuitBreaker {
    state: AtomicU8,
    failures: AtomicU32,
    successes: AtomicU32,
    changed_at_ms: AtomicI64,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            failures: AtomicU32::new(0),
            successes: AtomicU32::new(0),
            changed_at_ms: AtomicI64::new(current_time_ms()),
            config,
        }
    }

    /// Current state, moving Open -> HalfOpen once the reset timeout elapsed
    pub fn state(&self) -> CircuitState {
        let raw = CircuitState::from(self.state.load(Ordering::Acquire));
        if raw != CircuitState::Open {
            return raw;
        }

        let elapsed = current_time_ms() - self.changed_at_ms.load(Ordering::Acquire);
        if elapsed < self.config.reset_timeout_ms as i64 {
            return CircuitState::Open;
        }

        if self
            .state
            .compare_exchange(
                CircuitState::Open as u8,
                CircuitState::HalfOpen as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.successes.store(0, Ordering::Release);
            self.changed_at_ms.store(current_time_ms(), Ordering::Release);
            REDIS_CIRCUIT_BREAKER_STATE.set(CircuitState::HalfOpen as i64);
            tracing::info!("Redis circuit breaker half-open, allowing trial requests");
        }

        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub fn allow_request(&self) -> bool {
        self.state() != CircuitState::Open
    }

    pub fn record_success(&self) {
        match CircuitState::from(self.state.load(Ordering::Acquire)) {
            CircuitState::Closed => self.failures.store(0, Ordering::Release),
            CircuitState::HalfOpen => {
                let successes = self.successes.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.success_threshold {
                    self.transition(CircuitState::Closed);
                    tracing::info!("Redis circuit breaker closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        match CircuitState::from(self.state.load(Ordering::Acquire)) {
            CircuitState::Closed => {
                let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold {
                    self.transition(CircuitState::Open);
                    tracing::warn!(failures, "Redis circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                self.transition(CircuitState::Open);
                tracing::warn!("Redis circuit breaker reopened by a failed trial request");
            }
            CircuitState::Open => {
                self.changed_at_ms.store(current_time_ms(), Ordering::Release);
            }
        }
    }

    fn transition(&self, to: CircuitState) {
        self.state.store(to as u8, Ordering::Release);
        self.changed_at_ms.store(current_time_ms(), Ordering::Release);
        self.successes.store(0, Ordering::Release);
        if to == CircuitState::Closed {
            self.failures.store(0, Ordering::Release);
        }
        REDIS_CIRCUIT_BREAKER_STATE.set(to as i64);
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn breaker(failure_threshold: u32, reset_timeout_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold,
            success_threshold: 2,
            reset_timeout_ms,
        })
    }

    #[test]
    fn test_starts_closed() {
        let cb = CircuitBreaker::default();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_opens_after_consecutive_failures() {
        let cb = breaker(3, 60_000);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let cb = breaker(3, 60_000);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_then_closed_after_successes() {
        let cb = breaker(1, 10);
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_failed_trial_reopens() {
        let cb = breaker(1, 10);
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_failure();
        assert_eq!(
            CircuitState::from(cb.state.load(Ordering::Acquire)),
            CircuitState::Open
        );
    }

    #[test]
    fn test_config_from_redis_settings() {
        let redis = RedisConfig {
            circuit_breaker_reset_timeout_seconds: 7,
            ..RedisConfig::default()
        };
        let config = CircuitBreakerConfig::from(&redis);
        assert_eq!(config.reset_timeout_ms, 7_000);
        assert_eq!(config.failure_threshold, 5);
    }
}

use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

use crate::metrics::REDIS_CONNECTION_STATUS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RedisHealthStatus {
    Healthy = 0,
    Reconnecting = 1,
    CircuitOpen = 2,
}

impl From<u8> for RedisHealthStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => RedisHealthStatus::Healthy,
            2 => RedisHealthStatus::CircuitOpen,
            _ => RedisHealthStatus::Reconnecting,
        }
    }
}

/// Connection status of the publish connection, as reported by `/health`
pub struct RedisHealth {
    status: AtomicU8,
}

impl RedisHealth {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(RedisHealthStatus::Reconnecting as u8),
        }
    }

    pub fn set_connected(&self) {
        self.status
            .store(RedisHealthStatus::Healthy as u8, Ordering::Release);
        REDIS_CONNECTION_STATUS.set(1);
    }

    pub fn set_reconnecting(&self) {
        self.status
            .store(RedisHealthStatus::Reconnecting as u8, Ordering::Release);
        REDIS_CONNECTION_STATUS.set(0);
    }

    pub fn set_circuit_open(&self) {
        self.status
            .store(RedisHealthStatus::CircuitOpen as u8, Ordering::Release);
        REDIS_CONNECTION_STATUS.set(0);
    }

    pub fn status(&self) -> RedisHealthStatus {
        RedisHealthStatus::from(self.status.load(Ordering::Acquire))
    }

    pub fn is_healthy(&self) -> bool {
        self.status() == RedisHealthStatus::Healthy
    }
}

impl Default for RedisHealth {
    fn default() -> Self {
        Self::new()
    }
}

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub otel: OtelConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Per-connection timing and buffering
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Outbound queue capacity per connection
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Interval between ping control frames, in seconds
    #[serde(default = "default_ping_period")]
    pub ping_period_secs: u64,
    /// Read deadline, refreshed by every pong, in seconds
    #[serde(default = "default_pong_wait")]
    pub pong_wait_secs: u64,
    /// Deadline for a single socket write, in seconds
    #[serde(default = "default_write_wait")]
    pub write_wait_secs: u64,
    /// How long the bridge waits for room in a full outbound queue
    #[serde(default = "default_bridge_send_timeout")]
    pub bridge_send_timeout_ms: u64,
    /// How long shutdown waits for connections to drain
    #[serde(default = "default_shutdown_drain_timeout")]
    pub shutdown_drain_timeout_secs: u64,
}

fn default_queue_capacity() -> usize {
    256
}

fn default_ping_period() -> u64 {
    54
}

fn default_pong_wait() -> u64 {
    60
}

fn default_write_wait() -> u64 {
    10
}

fn default_bridge_send_timeout() -> u64 {
    1000
}

fn default_shutdown_drain_timeout() -> u64 {
    10
}

impl HubConfig {
    pub fn ping_period(&self) -> Duration {
        Duration::from_secs(self.ping_period_secs)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }

    pub fn bridge_send_timeout(&self) -> Duration {
        Duration::from_millis(self.bridge_send_timeout_ms)
    }

    pub fn shutdown_drain_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_drain_timeout_secs)
    }
}

/// Which distributed bus implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    #[default]
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    #[serde(default)]
    pub backend: BusBackend,
    /// Namespace prepended to the channel id to form the bus topic
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// Per-topic buffer of the in-memory backend
    #[serde(default = "default_memory_buffer_size")]
    pub memory_buffer_size: usize,
}

fn default_topic_prefix() -> String {
    "board-events:project:".to_string()
}

fn default_memory_buffer_size() -> usize {
    1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_cb_failure_threshold")]
    pub circuit_breaker_failure_threshold: u32,
    #[serde(default = "default_cb_success_threshold")]
    pub circuit_breaker_success_threshold: u32,
    #[serde(default = "default_cb_reset_timeout")]
    pub circuit_breaker_reset_timeout_seconds: u64,
    #[serde(default = "default_backoff_initial_delay")]
    pub backoff_initial_delay_ms: u64,
    #[serde(default = "default_backoff_max_delay")]
    pub backoff_max_delay_ms: u64,
    /// Startup connection attempts before running degraded
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// Upper bound on a single connect or command round trip
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,
}

impl RedisConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

fn default_cb_failure_threshold() -> u32 {
    5
}

fn default_cb_success_threshold() -> u32 {
    2
}

fn default_cb_reset_timeout() -> u64 {
    30
}

fn default_backoff_initial_delay() -> u64 {
    100
}

fn default_backoff_max_delay() -> u64 {
    30_000
}

fn default_connect_attempts() -> u32 {
    5
}

fn default_command_timeout() -> u64 {
    2000
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    pub key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "board-realtime-hub".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", 8082)?
            .set_default("redis.url", default_redis_url())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Double underscore keeps snake_case keys intact:
            // HUB__QUEUE_CAPACITY, JWT__SECRET, BUS__BACKEND, ...
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject configurations that would break the liveness or fan-out contract
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hub.ping_period_secs >= self.hub.pong_wait_secs {
            return Err(ConfigError::Message(format!(
                "hub.ping_period_secs ({}) must be less than hub.pong_wait_secs ({})",
                self.hub.ping_period_secs, self.hub.pong_wait_secs
            )));
        }
        if self.hub.ping_period_secs == 0 || self.hub.write_wait_secs == 0 {
            return Err(ConfigError::Message(
                "hub.ping_period_secs and hub.write_wait_secs must be positive".to_string(),
            ));
        }
        if self.hub.queue_capacity == 0 {
            return Err(ConfigError::Message(
                "hub.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.bus.topic_prefix.is_empty() {
            return Err(ConfigError::Message(
                "bus.topic_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            circuit_breaker_failure_threshold: default_cb_failure_threshold(),
            circuit_breaker_success_threshold: default_cb_success_threshold(),
            circuit_breaker_reset_timeout_seconds: default_cb_reset_timeout(),
            backoff_initial_delay_ms: default_backoff_initial_delay(),
            backoff_max_delay_ms: default_backoff_max_delay(),
            connect_attempts: default_connect_attempts(),
            command_timeout_ms: default_command_timeout(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::default(),
            topic_prefix: default_topic_prefix(),
            memory_buffer_size: default_memory_buffer_size(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            ping_period_secs: default_ping_period(),
            pong_wait_secs: default_pong_wait(),
            write_wait_secs: default_write_wait(),
            bridge_send_timeout_ms: default_bridge_send_timeout(),
            shutdown_drain_timeout_secs: default_shutdown_drain_timeout(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> Settings {
        Settings {
            server: ServerConfig::default(),
            jwt: JwtConfig {
                secret: "secret".to_string(),
                issuer: None,
                audience: None,
            },
            redis: RedisConfig::default(),
            bus: BusConfig::default(),
            hub: HubConfig::default(),
            api: ApiConfig::default(),
            otel: OtelConfig::default(),
            log: LogConfig::default(),
        }
    }

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8082);

        let hub = HubConfig::default();
        assert_eq!(hub.queue_capacity, 256);
        assert_eq!(hub.ping_period(), Duration::from_secs(54));
        assert_eq!(hub.pong_wait(), Duration::from_secs(60));
        assert_eq!(hub.write_wait(), Duration::from_secs(10));
        assert_eq!(hub.bridge_send_timeout(), Duration::from_secs(1));

        let bus = BusConfig::default();
        assert_eq!(bus.backend, BusBackend::Redis);
        assert_eq!(bus.topic_prefix, "board-events:project:");
    }

    #[test]
    fn test_defaults_pass_validation() {
        assert!(test_settings().validate().is_ok());
    }

    #[test]
    fn test_ping_period_must_be_shorter_than_pong_wait() {
        let mut settings = test_settings();
        settings.hub.ping_period_secs = 60;
        settings.hub.pong_wait_secs = 60;

        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("ping_period_secs"));
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let mut settings = test_settings();
        settings.hub.queue_capacity = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_empty_topic_prefix_rejected() {
        let mut settings = test_settings();
        settings.bus.topic_prefix = String::new();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_bus_backend_deserializes_lowercase() {
        let backend: BusBackend = serde_json::from_str("\"memory\"").unwrap();
        assert_eq!(backend, BusBackend::Memory);
    }
}

mod settings;

pub use settings::{
    ApiConfig, BusBackend, BusConfig, HubConfig, JwtConfig, LogConfig, OtelConfig, RedisConfig,
    ServerConfig, Settings,
};

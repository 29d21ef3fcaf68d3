//! HTTP surface next to the WebSocket endpoint.

mod events;
mod health;
mod metrics;
mod presence;
mod routes;

pub use events::publish_event;
pub use health::{health, stats};
pub use metrics::prometheus_metrics;
pub use presence::{online_users, PresenceResponse};
pub use routes::api_routes;

//! Real-time board event hub.
//!
//! Clients attach to a project channel over WebSocket; board mutations are
//! fanned out to every connection of that channel on this instance and, via
//! the event bus, on every other instance.

pub mod api;
pub mod auth;
pub mod bus;
pub mod config;
pub mod error;
pub mod event;
pub mod hub;
pub mod metrics;
pub mod redis;
pub mod server;
pub mod shutdown;
pub mod telemetry;
pub mod websocket;

//! Connection hub: membership, per-connection tasks and event fan-out.
//!
//! Each upgraded socket becomes a [`Connection`] registered under its project
//! channel and driven by three tasks: [`read_loop`], [`write_loop`] and
//! [`run_bridge`]. The [`EventBroadcaster`] delivers events to the local
//! [`ConnectionRegistry`] and publishes them for the other instances.

mod bridge;
mod broadcaster;
mod connection;
mod read_loop;
mod registry;
mod write_loop;

pub use bridge::{run_bridge, BridgeExit};
pub use broadcaster::{BroadcastReport, BroadcasterStats, EventBroadcaster};
pub use connection::{CloseGuard, Connection, ConnectionState, EnqueueError};
pub use read_loop::read_loop;
pub use registry::{ConnectionRegistry, LocalDelivery, RegistryStats};
pub use write_loop::write_loop;

mod handler;
mod message;

pub use handler::{serve_connection, validate_channel_id, ws_handler, WsQuery};
pub use message::{ClientMessage, OutboundMessage, ServerMessage};

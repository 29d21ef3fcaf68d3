use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Ping,
}

/// Messages generated by the hub itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Pong,
}

/// Element of a connection's outbound queue
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Hub-originated message, serialized by the write loop
    Raw(ServerMessage),
    /// Event frame serialized once and shared by every recipient
    Serialized(Arc<str>),
}

impl OutboundMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            OutboundMessage::Raw(message) => serde_json::to_string(message),
            OutboundMessage::Serialized(frame) => Ok(frame.to_string()),
        }
    }
}

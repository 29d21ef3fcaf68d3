//! Board mutation events.
//!
//! The serialized form is the envelope clients receive and the exact payload
//! carried on the distributed bus:
//!
//! ```json
//! {"type":"BOARD_MOVED","boardId":"b-42","payload":{"fromIndex":1,"toIndex":3}}
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A board mutation, fanned out to every connection of a project channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BoardEvent {
    #[serde(rename = "BOARD_CREATED")]
    Created {
        #[serde(rename = "boardId")]
        board_id: String,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        payload: Value,
    },
    #[serde(rename = "BOARD_UPDATED")]
    Updated {
        #[serde(rename = "boardId")]
        board_id: String,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        payload: Value,
    },
    #[serde(rename = "BOARD_MOVED")]
    Moved {
        #[serde(rename = "boardId")]
        board_id: String,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        payload: Value,
    },
    #[serde(rename = "BOARD_DELETED")]
    Deleted {
        #[serde(rename = "boardId")]
        board_id: String,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        payload: Value,
    },
}

impl BoardEvent {
    pub fn created(board_id: impl Into<String>, payload: Value) -> Self {
        Self::Created {
            board_id: board_id.into(),
            payload,
        }
    }

    pub fn updated(board_id: impl Into<String>, payload: Value) -> Self {
        Self::Updated {
            board_id: board_id.into(),
            payload,
        }
    }

    pub fn moved(board_id: impl Into<String>, payload: Value) -> Self {
        Self::Moved {
            board_id: board_id.into(),
            payload,
        }
    }

    pub fn deleted(board_id: impl Into<String>, payload: Value) -> Self {
        Self::Deleted {
            board_id: board_id.into(),
            payload,
        }
    }

    /// Wire name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "BOARD_CREATED",
            Self::Updated { .. } => "BOARD_UPDATED",
            Self::Moved { .. } => "BOARD_MOVED",
            Self::Deleted { .. } => "BOARD_DELETED",
        }
    }

    pub fn board_id(&self) -> &str {
        match self {
            Self::Created { board_id, .. }
            | Self::Updated { board_id, .. }
            | Self::Moved { board_id, .. }
            | Self::Deleted { board_id, .. } => board_id,
        }
    }

    pub fn payload(&self) -> &Value {
        match self {
            Self::Created { payload, .. }
            | Self::Updated { payload, .. }
            | Self::Moved { payload, .. }
            | Self::Deleted { payload, .. } => payload,
        }
    }

    /// Serialize once into the shared text frame handed to every connection
    pub fn to_frame(&self) -> Result<Arc<str>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }
}

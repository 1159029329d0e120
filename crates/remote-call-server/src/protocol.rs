//! Frames the server itself originates.

use remote_call_core::SessionId;
use serde::{Deserialize, Serialize};

/// `type` of the first frame sent on every connection.
pub const CONNECTION_ESTABLISHED_TYPE: &str = "connection_established";

/// Tells a freshly connected peer which session it was registered as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEstablished {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub connection_id: SessionId,
}

impl ConnectionEstablished {
    pub fn new(connection_id: SessionId) -> Self {
        Self {
            frame_type: CONNECTION_ESTABLISHED_TYPE.to_string(),
            connection_id,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

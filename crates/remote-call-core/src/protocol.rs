//! Wire frames exchanged with peers.
//!
//! Frames are JSON objects. The correlation field is spelled `tool_call_id`
//! on the wire; inbound frames may also use `correlation_id`.
//!
//! ```text
//! server -> peer  {"tool_call_id": "...", "type": "tool_call", "data": {"name": "...", "arguments": {...}}}
//! peer -> server  {"tool_call_id": "...", "response": <any>}
//! ```

use crate::error::FrameError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `type` value of an outgoing call frame.
pub const CALL_FRAME_TYPE: &str = "tool_call";

const CORRELATION_FIELD: &str = "tool_call_id";
const CORRELATION_FIELD_ALIAS: &str = "correlation_id";

/// Capability name and arguments of a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallData {
    pub name: String,
    pub arguments: Value,
}

/// Call frame sent to a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallFrame {
    #[serde(rename = "tool_call_id", alias = "correlation_id")]
    pub correlation_id: String,
    #[serde(rename = "type")]
    pub frame_type: String,
    pub data: CallData,
}

impl CallFrame {
    pub fn new(correlation_id: &str, name: &str, arguments: Value) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            frame_type: CALL_FRAME_TYPE.to_string(),
            data: CallData {
                name: name.to_string(),
                arguments,
            },
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Response frame received from a peer.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFrame {
    pub correlation_id: String,
    /// Opaque result payload; `null` when the peer omitted it.
    pub response: Value,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Carries a correlation ID and must be fed to `resolve_call`.
    Response(ResponseFrame),
    /// Any other object. The core has no use for it.
    Other { frame_type: Option<String> },
}

impl InboundFrame {
    /// Decode one text frame.
    ///
    /// Fails when the text is not a JSON object or when the correlation field
    /// is present but not a non-empty string. Such frames must not reach the
    /// core.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(mut map) = value else {
            return Err(FrameError::NotAnObject);
        };

        let correlation = map
            .remove(CORRELATION_FIELD)
            .or_else(|| map.remove(CORRELATION_FIELD_ALIAS));

        let correlation_id = match correlation {
            None => {
                return Ok(InboundFrame::Other {
                    frame_type: frame_type(&map),
                })
            }
            Some(Value::String(id)) if !id.is_empty() => id,
            Some(_) => return Err(FrameError::InvalidCorrelationId),
        };

        let response = map.remove("response").unwrap_or(Value::Null);
        Ok(InboundFrame::Response(ResponseFrame {
            correlation_id,
            response,
        }))
    }
}

fn frame_type(map: &Map<String, Value>) -> Option<String> {
    map.get("type").and_then(Value::as_str).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_frame_wire_shape() {
        let frame = CallFrame::new("call-1", "read_file", json!({"path": "/tmp/a"}));
        let value: Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "tool_call_id": "call-1",
                "type": "tool_call",
                "data": {"name": "read_file", "arguments": {"path": "/tmp/a"}}
            })
        );
    }

    #[test]
    fn test_call_frame_accepts_correlation_alias() {
        let frame = CallFrame::from_json(
            r#"{"correlation_id":"c-7","type":"tool_call","data":{"name":"ls","arguments":{}}}"#,
        )
        .unwrap();
        assert_eq!(frame.correlation_id, "c-7");
        assert_eq!(frame.data.name, "ls");
    }

    #[test]
    fn test_parse_response_frame() {
        let frame = InboundFrame::parse(r#"{"tool_call_id":"call-1","response":{"ok":true}}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Response(ResponseFrame {
                correlation_id: "call-1".to_string(),
                response: json!({"ok": true}),
            })
        );
    }

    #[test]
    fn test_parse_response_with_alias_and_missing_payload() {
        let frame = InboundFrame::parse(r#"{"correlation_id":"call-2"}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Response(ResponseFrame {
                correlation_id: "call-2".to_string(),
                response: Value::Null,
            })
        );
    }

    #[test]
    fn test_parse_frame_without_correlation() {
        let frame = InboundFrame::parse(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Other {
                frame_type: Some("heartbeat".to_string())
            }
        );
    }

    #[test]
    fn test_parse_rejects_malformed_frames() {
        assert!(matches!(
            InboundFrame::parse("not json"),
            Err(FrameError::Json(_))
        ));
        assert!(matches!(
            InboundFrame::parse("[1, 2]"),
            Err(FrameError::NotAnObject)
        ));
        assert!(matches!(
            InboundFrame::parse(r#"{"tool_call_id": 42}"#),
            Err(FrameError::InvalidCorrelationId)
        ));
        assert!(matches!(
            InboundFrame::parse(r#"{"tool_call_id": ""}"#),
            Err(FrameError::InvalidCorrelationId)
        ));
    }
}

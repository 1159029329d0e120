//! Routes inbound text frames from one connection into the registry.

use remote_call_core::{InboundFrame, SessionId, SessionRegistry};
use tracing::{debug, warn};

/// What happened to an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Delivered to a waiting call.
    Resolved { correlation_id: String },
    /// Carried a correlation ID that matched no pending call.
    Unmatched { correlation_id: String },
    /// Well-formed but carried no correlation ID.
    Ignored { frame_type: Option<String> },
    /// Not a JSON object, or the correlation ID was unusable.
    Malformed { reason: String },
}

/// Per-connection dispatcher. Every frame it sees is attributed to the
/// session the connection registered as.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: SessionRegistry,
    session_id: SessionId,
}

impl Dispatcher {
    pub fn new(registry: SessionRegistry, session_id: SessionId) -> Self {
        Self {
            registry,
            session_id,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Handle one text frame. Never fails: bad frames are logged and dropped.
    pub fn handle_text(&self, text: &str) -> DispatchOutcome {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    session_id = %self.session_id,
                    error = %e,
                    "Dropping malformed frame"
                );
                return DispatchOutcome::Malformed {
                    reason: e.to_string(),
                };
            }
        };

        match frame {
            InboundFrame::Response(response) => {
                let correlation_id = response.correlation_id;
                if self
                    .registry
                    .resolve_call(&self.session_id, &correlation_id, response.response)
                {
                    DispatchOutcome::Resolved { correlation_id }
                } else {
                    DispatchOutcome::Unmatched { correlation_id }
                }
            }
            InboundFrame::Other { frame_type } => {
                warn!(
                    session_id = %self.session_id,
                    frame_type = frame_type.as_deref().unwrap_or("<none>"),
                    "Received frame without correlation id"
                );
                debug!(session_id = %self.session_id, "Ignored frame body: {}", text);
                DispatchOutcome::Ignored { frame_type }
            }
        }
    }
}

//! Error types for remote calls.

use crate::session::SessionId;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a [`PeerChannel`](crate::PeerChannel) when a frame
/// cannot be handed to the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The connection's writer is gone
    #[error("channel closed")]
    Closed,

    /// The frame could not be encoded for the wire
    #[error("failed to encode frame: {0}")]
    Encode(String),

    /// The transport rejected the write
    #[error("transport error: {0}")]
    Transport(String),
}

/// Remote call error type.
///
/// Every variant is scoped to a single call (or the session that owned it).
/// None of them is fatal to the process.
#[derive(Error, Debug)]
pub enum CallError {
    /// No such session at issue time. Orchestrators report this as the
    /// client being unavailable.
    #[error("Client connection {0} not found or unavailable")]
    SessionUnavailable(SessionId),

    /// The transport rejected the outgoing call frame
    #[error("Failed to send call {correlation_id} to session {session_id}: {source}")]
    SendFailure {
        session_id: SessionId,
        correlation_id: String,
        #[source]
        source: ChannelError,
    },

    /// The deadline elapsed with no response
    #[error("Call {correlation_id} timed out after {timeout:?}")]
    Timeout {
        correlation_id: String,
        timeout: Duration,
    },

    /// The owning session disconnected while the call was outstanding
    #[error("Call {correlation_id} cancelled: session disconnected")]
    Cancelled { correlation_id: String },

    /// Unexpected fault while issuing or awaiting a call
    #[error("Execution error: {0}")]
    Execution(String),
}

impl CallError {
    /// Short, stable name of the variant for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::SessionUnavailable(_) => "session_unavailable",
            CallError::SendFailure { .. } => "send_failure",
            CallError::Timeout { .. } => "timeout",
            CallError::Cancelled { .. } => "cancelled",
            CallError::Execution(_) => "execution",
        }
    }
}

/// Result type alias using CallError.
pub type CallResult<T> = Result<T, CallError>;

/// Errors raised while decoding an inbound frame.
#[derive(Error, Debug)]
pub enum FrameError {
    /// Payload was not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload was valid JSON but not an object
    #[error("Frame is not a JSON object")]
    NotAnObject,

    /// A correlation field was present but not a string
    #[error("Correlation ID must be a string")]
    InvalidCorrelationId,
}

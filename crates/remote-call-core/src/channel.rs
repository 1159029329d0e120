//! Outbound channel abstraction.
//!
//! A [`PeerChannel`] is the only thing the core needs from a transport: a way
//! to hand a call frame to the peer. Reading from the connection stays with
//! the transport, which feeds responses back through
//! [`SessionRegistry::resolve_call`](crate::SessionRegistry::resolve_call).

use crate::error::ChannelError;
use crate::protocol::CallFrame;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Send half of a peer connection.
///
/// Implementations may be called from several tasks at once for the same
/// session. Transports that cannot tolerate concurrent writers must
/// serialize internally, typically by funnelling frames through a single
/// writer task as the `mpsc` implementation below does.
#[async_trait]
pub trait PeerChannel: Send + Sync {
    async fn send_call(&self, frame: &CallFrame) -> Result<(), ChannelError>;
}

/// Frames are queued for a dedicated writer task that owns the socket.
#[async_trait]
impl PeerChannel for mpsc::Sender<CallFrame> {
    async fn send_call(&self, frame: &CallFrame) -> Result<(), ChannelError> {
        self.send(frame.clone())
            .await
            .map_err(|_| ChannelError::Closed)
    }
}

//! WebSocket-backed peer channel.

use async_trait::async_trait;
use remote_call_core::{CallFrame, ChannelError, PeerChannel};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Queues call frames onto a connection's writer task.
///
/// The writer task owns the socket sink; once it exits the queue is closed
/// and every further send reports [`ChannelError::Closed`].
#[derive(Debug, Clone)]
pub struct WsChannel {
    outbound: mpsc::Sender<Message>,
}

impl WsChannel {
    pub fn new(outbound: mpsc::Sender<Message>) -> Self {
        Self { outbound }
    }
}

#[async_trait]
impl PeerChannel for WsChannel {
    async fn send_call(&self, frame: &CallFrame) -> Result<(), ChannelError> {
        let json = frame
            .to_json()
            .map_err(|e| ChannelError::Encode(e.to_string()))?;
        self.outbound
            .send(Message::Text(json.into()))
            .await
            .map_err(|_| ChannelError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_send_call_queues_text_frame() {
        let (tx, mut rx) = mpsc::channel(4);
        let channel = WsChannel::new(tx);

        let frame = CallFrame::new("call-1", "read_file", json!({"path": "/tmp/x"}));
        channel.send_call(&frame).await.unwrap();

        let message = rx.recv().await.unwrap();
        let text = match message {
            Message::Text(text) => text.to_string(),
            other => panic!("expected text frame, got {:?}", other),
        };
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["tool_call_id"], "call-1");
        assert_eq!(value["type"], "tool_call");
        assert_eq!(value["data"]["name"], "read_file");
    }

    #[tokio::test]
    async fn test_send_after_writer_exit_is_closed() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let channel = WsChannel::new(tx);

        let err = channel
            .send_call(&CallFrame::new("call-1", "echo", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err, ChannelError::Closed);
    }
}

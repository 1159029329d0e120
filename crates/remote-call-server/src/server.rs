//! WebSocket accept loop and per-connection lifecycle.
//!
//! Each connection goes through the same steps:
//!
//! 1. Handshake. Capabilities are read from `?capabilities=a,b` on the
//!    request URI.
//! 2. A writer task takes the sink half; everything outbound goes through
//!    its queue.
//! 3. The connection is registered and told its session ID.
//! 4. Inbound text frames go to the [`Dispatcher`] until the peer closes,
//!    the stream errors, or the server shuts down.
//! 5. The session is unregistered, cancelling whatever it still owed.

use crate::dispatcher::Dispatcher;
use crate::error::ServerResult;
use crate::protocol::ConnectionEstablished;
use crate::transport::WsChannel;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use remote_call_core::{ChannelExecutor, PeerChannel, SessionId, SessionRegistry};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn, Instrument};

/// Query parameter listing the capabilities a peer offers.
pub const CAPABILITIES_PARAM: &str = "capabilities";

const OUTBOUND_QUEUE: usize = 64;
const WRITER_DRAIN: Duration = Duration::from_secs(2);

/// Accepts peer connections and keeps their sessions registered.
pub struct BridgeServer {
    listener: TcpListener,
    registry: SessionRegistry,
    call_timeout: Duration,
    shutdown_tx: broadcast::Sender<()>,
}

impl BridgeServer {
    /// Bind the listener. Use port 0 to let the OS pick one.
    ///
    /// `call_timeout` is the deadline handed to executors built by
    /// [`BridgeServer::executor`].
    pub async fn bind(
        addr: SocketAddr,
        registry: SessionRegistry,
        call_timeout: Duration,
    ) -> ServerResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            listener,
            registry,
            call_timeout,
            shutdown_tx,
        })
    }

    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Executor issuing calls to this server's peers with the configured
    /// default timeout.
    pub fn executor(&self) -> ChannelExecutor {
        ChannelExecutor::with_default_timeout(self.registry.clone(), self.call_timeout)
    }

    /// Sender that stops the accept loop and closes every connection.
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Run until a shutdown signal is received.
    pub async fn run(self) -> ServerResult<()> {
        let addr = self.local_addr()?;
        info!(%addr, "Bridge server listening");

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let registry = self.registry.clone();
                            let shutdown_rx = self.shutdown_tx.subscribe();
                            let span = tracing::info_span!("connection", peer = %peer_addr);
                            tokio::spawn(
                                async move {
                                    if let Err(e) =
                                        handle_connection(stream, registry, shutdown_rx).await
                                    {
                                        warn!(error = %e, "Connection ended with error");
                                    }
                                }
                                .instrument(span),
                            );
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Bridge server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Pull the capability list out of a request query string.
pub fn capabilities_from_query(query: Option<&str>) -> Vec<String> {
    let Some(query) = query else {
        return Vec::new();
    };
    url::form_urlencoded::parse(query.as_bytes())
        .filter(|(key, _)| key == CAPABILITIES_PARAM)
        .flat_map(|(_, value)| {
            value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

async fn handle_connection(
    stream: TcpStream,
    registry: SessionRegistry,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> ServerResult<()> {
    let mut capabilities = Vec::new();
    let ws_stream = tokio_tungstenite::accept_hdr_async(
        stream,
        |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            capabilities = capabilities_from_query(request.uri().query());
            Ok(response)
        },
    )
    .await?;

    let (mut write, mut read) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE);

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if let Err(e) = write.send(message).await {
                debug!(error = %e, "WebSocket write failed, stopping writer");
                break;
            }
        }
        let _ = write.close().await;
    });

    let channel: Arc<dyn PeerChannel> = Arc::new(WsChannel::new(outbound_tx.clone()));
    let session_id = registry.register(channel, capabilities);

    let greeted = match ConnectionEstablished::new(session_id).to_json() {
        Ok(hello) => {
            if outbound_tx.send(Message::Text(hello.into())).await.is_err() {
                warn!(%session_id, "Writer closed before handshake completed");
            }
            true
        }
        Err(e) => {
            error!(%session_id, error = %e, "Failed to encode connection_established frame");
            false
        }
    };

    if greeted {
        read_frames(&mut read, &registry, session_id, &outbound_tx, &mut shutdown_rx).await;
    }

    let cancelled = registry.unregister(&session_id);
    info!(%session_id, cancelled, "Connection closed");

    drop(outbound_tx);
    if tokio::time::timeout(WRITER_DRAIN, writer).await.is_err() {
        debug!(%session_id, "Writer did not drain in time");
    }

    Ok(())
}

/// Feed inbound frames to the dispatcher until close, error, or shutdown.
///
/// Pings are answered by tungstenite itself on the next read or write.
async fn read_frames(
    read: &mut SplitStream<WebSocketStream<TcpStream>>,
    registry: &SessionRegistry,
    session_id: SessionId,
    outbound_tx: &mpsc::Sender<Message>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) {
    let dispatcher = Dispatcher::new(registry.clone(), session_id);

    loop {
        tokio::select! {
            next = read.next() => {
                match next {
                    Some(Ok(Message::Text(text))) => {
                        dispatcher.handle_text(&text);
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(%session_id, "Peer closed connection");
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!(%session_id, "Ignoring binary frame");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(%session_id, error = %e, "WebSocket read failed");
                        break;
                    }
                    None => break,
                }
            }
            _ = shutdown_rx.recv() => {
                debug!(%session_id, "Closing connection for shutdown");
                let _ = outbound_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

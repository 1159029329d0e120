//! Connection lifecycle: handshake, capabilities, close, shutdown.

use super::harness::{connect_peer, TestServer};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn handshake_registers_session_with_capabilities() {
    let server = TestServer::start().await;
    let (_socket, session_id) = connect_peer(&server, Some("capabilities=echo,read_file")).await;

    let session = server.registry.lookup(&session_id).unwrap();
    assert!(session.supports("echo"));
    assert!(session.supports("read_file"));
    assert!(!session.supports("shell"));
}

#[tokio::test]
async fn handshake_without_query_registers_no_capabilities() {
    let server = TestServer::start().await;
    let (_socket, session_id) = connect_peer(&server, None).await;

    let session = server.registry.lookup(&session_id).unwrap();
    assert!(session.capabilities.is_empty());
}

#[tokio::test]
async fn each_connection_gets_its_own_session() {
    let server = TestServer::start().await;
    let (_a, first) = connect_peer(&server, None).await;
    let (_b, second) = connect_peer(&server, None).await;

    assert_ne!(first, second);
    assert_eq!(server.registry.session_count(), 2);
}

#[tokio::test]
async fn close_unregisters_session() {
    let server = TestServer::start().await;
    let (mut socket, session_id) = connect_peer(&server, None).await;
    assert_eq!(server.registry.session_count(), 1);

    socket.close(None).await.unwrap();
    server.wait_for_sessions(0).await;
    assert!(server.registry.lookup(&session_id).is_err());
}

#[tokio::test]
async fn dropped_socket_unregisters_session() {
    let server = TestServer::start().await;
    let (socket, _) = connect_peer(&server, None).await;

    drop(socket);
    server.wait_for_sessions(0).await;
}

#[tokio::test]
async fn shutdown_closes_connections_and_stops_accepting() {
    let server = TestServer::start().await;
    let (mut socket, _) = connect_peer(&server, None).await;

    server.shutdown.send(()).unwrap();

    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "peer never saw the connection close");

    server.wait_for_sessions(0).await;
    let result = tokio::time::timeout(Duration::from_secs(2), server.handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn executor_carries_configured_call_timeout() {
    let config = crate::ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        call_timeout_secs: 7,
        ..Default::default()
    };
    let server = crate::BridgeServer::bind(
        config.bind_addr,
        remote_call_core::SessionRegistry::new(),
        config.call_timeout(),
    )
    .await
    .unwrap();

    assert_eq!(server.call_timeout(), Duration::from_secs(7));
    assert_eq!(server.executor().default_timeout(), Duration::from_secs(7));
}

#[tokio::test]
async fn harness_executor_uses_server_timeout() {
    let server = TestServer::start().await;
    assert_eq!(server.executor.default_timeout(), super::harness::CALL_TIMEOUT);
}

#[tokio::test]
async fn peer_leaving_before_greeting_is_read_is_unregistered() {
    let server = TestServer::start().await;
    let (socket, _) = tokio_tungstenite::connect_async(server.url(None))
        .await
        .unwrap();
    server.wait_for_sessions(1).await;

    drop(socket);
    server.wait_for_sessions(0).await;
}

#[tokio::test]
async fn ping_is_answered_exactly_once() {
    let server = TestServer::start().await;
    let (mut socket, _) = connect_peer(&server, None).await;

    socket.send(Message::Ping(vec![7u8].into())).await.unwrap();

    let pong = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Pong(data))) => break data,
                Some(Ok(_)) => continue,
                other => panic!("connection ended before pong: {:?}", other),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(&pong[..], &[7u8][..]);

    let extra = tokio::time::timeout(Duration::from_millis(200), socket.next()).await;
    assert!(extra.is_err(), "unexpected extra frame: {:?}", extra);
    assert_eq!(server.registry.session_count(), 1);
}

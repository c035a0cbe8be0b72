//! Integration tests for the relay server.
//!
//! These tests start a real server instance and connect via WebSocket
//! to verify end-to-end behavior.

use futures_util::{SinkExt, StreamExt};
use relay_server::config::ServerConfig;
use relay_shared::protocol::{Frame, WelcomeMsg};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message};

type Ws =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// How long to wait before concluding a client received nothing.
const QUIET: Duration = Duration::from_millis(200);

/// Start a test server on an ephemeral port and return the WebSocket URL.
async fn start_test_server() -> String {
    start_test_server_with(ServerConfig::default()).await
}

async fn start_test_server_with(config: ServerConfig) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        relay_server::app::run(listener, config, std::future::pending())
            .await
            .unwrap();
    });

    format!("ws://{}/ws", addr)
}

/// Connect and consume the welcome frame. Returns the socket and session id.
async fn connect(url: &str) -> (Ws, u64) {
    let (mut ws, _) = connect_async(url).await.expect("Failed to connect");
    let frame = recv_frame(&mut ws).await;
    assert!(frame.is_welcome(), "Expected welcome, got {:?}", frame);
    let welcome: WelcomeMsg = frame.data.parse().unwrap();
    (ws, welcome.session_id)
}

/// Read the next text message as raw text.
async fn recv_text(ws: &mut Ws) -> String {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return text.as_str().to_string(),
            Some(Ok(_)) => continue, // Skip ping/pong
            Some(Err(e)) => panic!("WebSocket error: {}", e),
            None => panic!("WebSocket closed unexpectedly"),
        }
    }
}

async fn recv_frame(ws: &mut Ws) -> Frame {
    let text = recv_text(ws).await;
    Frame::decode(&text).expect("Failed to parse server frame")
}

/// Next text message, or None if nothing arrives within `timeout`.
async fn recv_text_timeout(ws: &mut Ws, timeout: Duration) -> Option<String> {
    tokio::time::timeout(timeout, recv_text(ws)).await.ok()
}

async fn send_message(ws: &mut Ws, data: &str) {
    let text = format!(r#"{{"type":"message","data":{}}}"#, data);
    ws.send(Message::Text(text.into())).await.unwrap();
}

async fn expect_message(ws: &mut Ws, data: &str) {
    let frame = tokio::time::timeout(Duration::from_secs(2), recv_frame(ws))
        .await
        .expect("timed out waiting for message");
    assert!(frame.is_message(), "Expected message, got {:?}", frame);
    assert_eq!(frame.data.as_str(), data);
}

async fn expect_silence(ws: &mut Ws) {
    if let Some(text) = recv_text_timeout(ws, QUIET).await {
        panic!("Expected no message, got {}", text);
    }
}

/// Wait until the server has dropped the connection.
async fn expect_disconnected(ws: &mut Ws) {
    for _ in 0..10 {
        match tokio::time::timeout(Duration::from_millis(200), ws.next()).await {
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => return,
            Ok(Some(Ok(_))) => continue,
            Err(_) => {
                if ws.send(Message::Ping(vec![].into())).await.is_err() {
                    return;
                }
            }
        }
    }
    panic!("Client should have been disconnected");
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_connect_and_receive_welcome() {
    let url = start_test_server().await;
    let (mut ws, _) = connect_async(&url).await.unwrap();

    let frame = recv_frame(&mut ws).await;
    assert!(frame.is_welcome());
    let welcome: WelcomeMsg = frame.data.parse().unwrap();
    assert_eq!(welcome.protocol_version, 1);
    assert!(welcome.session_id > 0, "session_id should be positive");
}

#[tokio::test]
async fn test_multiple_clients_get_unique_ids() {
    let url = start_test_server().await;
    let (_ws1, id1) = connect(&url).await;
    let (_ws2, id2) = connect(&url).await;
    assert_ne!(id1, id2, "Each client should get a unique ID");
}

#[tokio::test]
async fn test_message_reaches_others_not_sender() {
    let url = start_test_server().await;
    let (mut a, _) = connect(&url).await;
    let (mut b, _) = connect(&url).await;
    let (mut c, _) = connect(&url).await;

    send_message(&mut a, r#"{"action":"create","x":5}"#).await;

    expect_message(&mut b, r#"{"action":"create","x":5}"#).await;
    expect_message(&mut c, r#"{"action":"create","x":5}"#).await;
    expect_silence(&mut a).await;
}

#[tokio::test]
async fn test_disconnected_client_is_skipped() {
    let url = start_test_server().await;
    let (mut a, _) = connect(&url).await;
    let (mut b, _) = connect(&url).await;
    let (mut c, _) = connect(&url).await;

    a.close(None).await.unwrap();
    // Let the server see the close before B speaks
    tokio::time::sleep(Duration::from_millis(100)).await;

    send_message(&mut b, r#"{"action":"repulse","x":-40,"key":2}"#).await;

    expect_message(&mut c, r#"{"action":"repulse","x":-40,"key":2}"#).await;
    expect_silence(&mut b).await;
}

#[tokio::test]
async fn test_lone_client_message_is_noop() {
    let url = start_test_server().await;
    let (mut a, _) = connect(&url).await;

    send_message(&mut a, r#"{"action":"create","x":0}"#).await;
    expect_silence(&mut a).await;

    // Server still works afterwards
    let (mut b, _) = connect(&url).await;
    send_message(&mut a, r#"{"after":true}"#).await;
    expect_message(&mut b, r#"{"after":true}"#).await;
}

#[tokio::test]
async fn test_payload_is_byte_identical() {
    let url = start_test_server().await;
    let (mut a, _) = connect(&url).await;
    let (mut b, _) = connect(&url).await;

    // Odd spacing, key order and number formatting must all survive
    let data = r#"{ "x" : 5.0e0,"action":"create",  "key":[1, "two", null],"z":{} }"#;
    send_message(&mut a, data).await;
    expect_message(&mut b, data).await;
}

#[tokio::test]
async fn test_unvalidated_payload_shapes_are_relayed() {
    let url = start_test_server().await;
    let (mut a, _) = connect(&url).await;
    let (mut b, _) = connect(&url).await;

    for data in [r#""just a string""#, "12", "[]", "null", r#"{"action":"???"}"#] {
        send_message(&mut a, data).await;
        expect_message(&mut b, data).await;
    }

    // Missing data relays as null
    a.send(Message::Text(r#"{"type":"message"}"#.into()))
        .await
        .unwrap();
    expect_message(&mut b, "null").await;
}

#[tokio::test]
async fn test_every_client_hears_every_other() {
    let url = start_test_server().await;
    let mut clients = Vec::new();
    for _ in 0..5 {
        clients.push(connect(&url).await);
    }

    for i in 0..clients.len() {
        let data = format!(r#"{{"from":{}}}"#, clients[i].1);
        send_message(&mut clients[i].0, &data).await;

        for (j, (ws, _)) in clients.iter_mut().enumerate() {
            if j != i {
                expect_message(ws, &data).await;
            }
        }
    }

    for (ws, _) in clients.iter_mut() {
        expect_silence(ws).await;
    }
}

#[tokio::test]
async fn test_per_sender_order_is_preserved() {
    let url = start_test_server().await;
    let (mut a, _) = connect(&url).await;
    let (mut b, _) = connect(&url).await;

    for i in 0..100 {
        send_message(&mut a, &i.to_string()).await;
    }
    for i in 0..100 {
        expect_message(&mut b, &i.to_string()).await;
    }
}

#[tokio::test]
async fn test_unknown_events_and_garbage_are_ignored() {
    let url = start_test_server().await;
    let (mut a, _) = connect(&url).await;
    let (mut b, _) = connect(&url).await;

    a.send(Message::Text("not valid json".into())).await.unwrap();
    a.send(Message::Text(r#"{"type":"chat","data":"hi"}"#.into()))
        .await
        .unwrap();
    a.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
    send_message(&mut a, r#"{"ok":1}"#).await;

    // Only the real message comes through, and A is still connected
    expect_message(&mut b, r#"{"ok":1}"#).await;
    expect_silence(&mut b).await;
    send_message(&mut a, r#"{"ok":2}"#).await;
    expect_message(&mut b, r#"{"ok":2}"#).await;
}

#[tokio::test]
async fn test_oversized_message_disconnects_client() {
    let url = start_test_server_with(ServerConfig {
        max_message_bytes: 1024,
        ..Default::default()
    })
    .await;
    let (mut a, _) = connect(&url).await;
    let (mut b, _) = connect(&url).await;

    let huge = format!(r#"{{"pad":"{}"}}"#, "x".repeat(2000));
    let _ = a
        .send(Message::Text(
            format!(r#"{{"type":"message","data":{}}}"#, huge).into(),
        ))
        .await;

    expect_disconnected(&mut a).await;
    expect_silence(&mut b).await;
}

#[tokio::test]
async fn test_reconnect_gets_fresh_session() {
    let url = start_test_server().await;
    let (mut a, id_a) = connect(&url).await;
    let (mut b, _) = connect(&url).await;

    a.close(None).await.unwrap();
    let (mut a2, id_a2) = connect(&url).await;
    assert_ne!(id_a, id_a2);

    send_message(&mut b, r#"{"hello":"again"}"#).await;
    expect_message(&mut a2, r#"{"hello":"again"}"#).await;
}

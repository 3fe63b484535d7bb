//! WebSocket integration tests: a real server, real sockets.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, header},
};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_tungstenite::tungstenite::protocol::Message;
use tower::ServiceExt;
use uuid::Uuid;

mod common;
use common::test_app;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn start_chat(app: &Router, conversation_id: Uuid, text: &str) {
    let body = json!({"content": [{"type": "text", "data": {"text": text}}]});
    let request = Request::builder()
        .uri(format!("/chats/chat?conversation_id={conversation_id}"))
        .method(Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert!(response.status().is_success());
}

async fn connect(url: String) -> Socket {
    let (socket, _) = tokio::time::timeout(Duration::from_secs(2), connect_async(url))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    socket
}

/// Read JSON frames until the server closes the socket.
async fn read_until_close(socket: &mut Socket) -> Vec<Value> {
    let mut frames = Vec::new();
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("socket went quiet without closing");
        match frame {
            Some(Ok(Message::Text(text))) => {
                frames.push(serde_json::from_str(&text).unwrap());
            }
            Some(Ok(Message::Close(_))) | None => return frames,
            Some(Ok(_)) => {}
            Some(Err(_)) => return frames,
        }
    }
}

/// Read JSON frames until one satisfies the predicate.
async fn read_until(socket: &mut Socket, predicate: impl Fn(&Value) -> bool) -> Vec<Value> {
    let mut frames = Vec::new();
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("expected frame never arrived");
        if let Some(Ok(Message::Text(text))) = frame {
            let value: Value = serde_json::from_str(&text).unwrap();
            let done = predicate(&value);
            frames.push(value);
            if done {
                return frames;
            }
        }
    }
}

#[tokio::test]
async fn test_single_socket_streams_run_and_closes_on_done() {
    let app = test_app().await;
    let addr = spawn_server(app.clone()).await;
    let conversation_id = Uuid::new_v4();

    // The run may well finish before the socket attaches; the queue keeps
    // its events for late subscribers.
    start_chat(&app, conversation_id, "hi").await;

    let mut socket = connect(format!(
        "ws://{addr}/chats/ws?conversation_id={conversation_id}"
    ))
    .await;
    let frames = read_until_close(&mut socket).await;

    let chunks: String = frames
        .iter()
        .filter(|frame| frame["type"] == "content_chunk")
        .filter_map(|frame| frame["data"].as_str())
        .collect();
    assert_eq!(chunks, "Hello world");
    assert_eq!(frames.last().unwrap()["type"], "done");
}

#[tokio::test]
async fn test_ping_on_idle_session_gets_stopped_notice_and_close() {
    let app = test_app().await;
    let addr = spawn_server(app).await;
    let conversation_id = Uuid::new_v4();

    let mut socket = connect(format!(
        "ws://{addr}/chats/ws?conversation_id={conversation_id}"
    ))
    .await;
    socket
        .send(Message::Text(r#"{"type":"ping"}"#.into()))
        .await
        .unwrap();

    let frames = read_until_close(&mut socket).await;
    assert_eq!(frames[0]["type"], "ack");
    assert_eq!(frames[1]["type"], "stopped");
    assert_eq!(frames[1]["conversation_id"], conversation_id.to_string());
    assert_eq!(frames.len(), 2);
}

#[tokio::test]
async fn test_inbound_frames_are_acked() {
    let app = test_app().await;
    let addr = spawn_server(app.clone()).await;
    let conversation_id = Uuid::new_v4();

    // Keep the session busy so the ack is not followed by a stopped notice.
    let mut socket = connect(format!(
        "ws://{addr}/chats/ws?conversation_id={conversation_id}"
    ))
    .await;
    socket
        .send(Message::Text(r#"{"note":"anything"}"#.into()))
        .await
        .unwrap();

    let frames = read_until(&mut socket, |frame| frame["type"] == "ack").await;
    assert_eq!(frames.last().unwrap()["type"], "ack");
}

#[tokio::test]
async fn test_multiplexed_socket_tags_payloads_and_survives_terminals() {
    let app = test_app().await;
    let addr = spawn_server(app.clone()).await;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    let mut socket = connect(format!("ws://{addr}/chats/ws-all?conversation_ids={first}")).await;

    start_chat(&app, first, "one").await;
    let frames = read_until(&mut socket, |frame| {
        frame["type"] == "done" && frame["conversation_id"] == first.to_string()
    })
    .await;
    assert!(
        frames
            .iter()
            .all(|frame| frame["conversation_id"] == first.to_string())
    );

    // Dynamic subscribe, then a second run streams over the same socket.
    socket
        .send(Message::Text(
            json!({"type": "subscribe", "conversation_ids": [second]})
                .to_string()
                .into(),
        ))
        .await
        .unwrap();
    // Subscribing twice is a no-op.
    socket
        .send(Message::Text(
            json!({"type": "subscribe", "conversation_ids": [second]})
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

    start_chat(&app, second, "two").await;
    let frames = read_until(&mut socket, |frame| {
        frame["type"] == "done" && frame["conversation_id"] == second.to_string()
    })
    .await;
    let done_count = frames
        .iter()
        .filter(|frame| {
            frame["type"] == "done" && frame["conversation_id"] == second.to_string()
        })
        .count();
    assert_eq!(done_count, 1);

    // Both runs are finished, so a ping reports nothing active.
    socket
        .send(Message::Text(r#"{"type":"ping"}"#.into()))
        .await
        .unwrap();
    let frames = read_until(&mut socket, |frame| frame["type"] == "pong").await;
    assert_eq!(
        frames.last().unwrap()["active_conversations"],
        json!([])
    );

    // Unsubscribe is idempotent and leaves the socket usable.
    socket
        .send(Message::Text(
            json!({"type": "unsubscribe", "conversation_ids": [first, second]})
                .to_string()
                .into(),
        ))
        .await
        .unwrap();
    socket
        .send(Message::Text(r#"{"type":"ping"}"#.into()))
        .await
        .unwrap();
    let frames = read_until(&mut socket, |frame| frame["type"] == "pong").await;
    assert_eq!(
        frames.last().unwrap()["active_conversations"],
        json!([])
    );
}

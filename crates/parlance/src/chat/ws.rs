//! WebSocket transport for conversation event streams.
//!
//! Two surfaces: a single-conversation socket that closes after the run's
//! terminal event, and a multiplexed socket that forwards any number of
//! conversations with `subscribe`/`unsubscribe` control messages. A write
//! failure kills only the affected forwarder; the session keeps running
//! and buffering for reconnection.

use std::collections::HashMap;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::api::{ApiError, AppState};

use super::events::{self, WireEvent};

/// Size of the per-connection send buffer.
const CONNECTION_BUFFER_SIZE: usize = 64;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub conversation_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct WsAllParams {
    /// Comma-separated conversation ids to subscribe on connect.
    #[serde(default)]
    pub conversation_ids: Option<String>,
}

/// Control messages accepted by the multiplexed socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlMessage {
    Subscribe { conversation_ids: Vec<Uuid> },
    Unsubscribe { conversation_ids: Vec<Uuid> },
    Ping,
}

/// Minimal shape of any inbound frame on the single-conversation socket.
#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(rename = "type")]
    kind: String,
}

/// Single-conversation event stream.
///
/// GET /chats/ws?conversation_id=...
pub async fn ws_conversation(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let conversation_id = params.conversation_id;
    info!("WebSocket attach for conversation {conversation_id}");
    ws.on_upgrade(move |socket| handle_conversation_socket(socket, state, conversation_id))
}

async fn handle_conversation_socket(socket: WebSocket, state: AppState, conversation_id: Uuid) {
    let session = state.chats.get_or_create(conversation_id);
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(CONNECTION_BUFFER_SIZE);

    // Writer task: sole owner of the socket sink.
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sender.send(message).await.is_err() {
                break;
            }
            if closing {
                break;
            }
        }
    });

    // Forwarder task: drains the session queue until a terminal event,
    // then proactively closes the socket.
    let forward_tx = tx.clone();
    let queue = session.queue();
    let forwarder = tokio::spawn(async move {
        loop {
            let event = queue.recv().await;
            let terminal = event.is_terminal();
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!("failed to serialize event: {err}");
                    continue;
                }
            };
            if forward_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
            if terminal {
                let _ = forward_tx.send(Message::Close(None)).await;
                break;
            }
        }
    });

    // Inbound frames: ack everything; a ping against an idle session gets
    // a stopped notice and closure.
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let ack = serde_json::to_string(&WireEvent::Ack).unwrap_or_default();
                if tx.send(Message::Text(ack.into())).await.is_err() {
                    break;
                }

                let is_ping = serde_json::from_str::<InboundFrame>(&text)
                    .map(|frame| frame.kind == "ping")
                    .unwrap_or(false);
                if is_ping && !session.is_running().await {
                    let notice =
                        events::with_conversation_id(&WireEvent::Stopped, conversation_id);
                    let _ = tx.send(Message::Text(notice.to_string().into())).await;
                    let _ = tx.send(Message::Close(None)).await;
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                info!("client closed socket for conversation {conversation_id}");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                warn!("WebSocket error on conversation {conversation_id}: {err}");
                break;
            }
        }
    }

    forwarder.abort();
    drop(tx);
    let _ = writer.await;
    debug!("socket closed for conversation {conversation_id}");
}

/// Multiplexed event stream over many conversations.
///
/// GET /chats/ws-all?conversation_ids=a,b,c
pub async fn ws_conversations(
    State(state): State<AppState>,
    Query(params): Query<WsAllParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let initial = parse_id_list(params.conversation_ids.as_deref())?;
    Ok(ws.on_upgrade(move |socket| handle_multiplex_socket(socket, state, initial)))
}

fn parse_id_list(csv: Option<&str>) -> Result<Vec<Uuid>, ApiError> {
    let Some(csv) = csv else {
        return Ok(Vec::new());
    };
    csv.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            Uuid::parse_str(part)
                .map_err(|_| ApiError::bad_request(format!("invalid conversation id: {part}")))
        })
        .collect()
}

async fn handle_multiplex_socket(socket: WebSocket, state: AppState, initial: Vec<Uuid>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(CONNECTION_BUFFER_SIZE);

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut forwarders: HashMap<Uuid, JoinHandle<()>> = HashMap::new();
    for conversation_id in initial {
        subscribe(&state, &tx, &mut forwarders, conversation_id);
    }

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ControlMessage>(&text) {
                Ok(ControlMessage::Subscribe { conversation_ids }) => {
                    for conversation_id in conversation_ids {
                        subscribe(&state, &tx, &mut forwarders, conversation_id);
                    }
                }
                Ok(ControlMessage::Unsubscribe { conversation_ids }) => {
                    for conversation_id in conversation_ids {
                        if let Some(handle) = forwarders.remove(&conversation_id) {
                            handle.abort();
                            debug!("unsubscribed from conversation {conversation_id}");
                        }
                    }
                }
                Ok(ControlMessage::Ping) => {
                    let mut active = Vec::new();
                    for conversation_id in forwarders.keys() {
                        if let Some(session) = state.chats.get(*conversation_id) {
                            if session.is_running().await {
                                active.push(conversation_id.to_string());
                            }
                        }
                    }
                    let pong = serde_json::json!({
                        "type": "pong",
                        "active_conversations": active,
                    });
                    if tx.send(Message::Text(pong.to_string().into())).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!("unparseable control message: {err} - {text}");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!("WebSocket error on multiplexed socket: {err}");
                break;
            }
        }
    }

    for (_, handle) in forwarders.drain() {
        handle.abort();
    }
    drop(tx);
    let _ = writer.await;
}

/// Attach a forwarder for one conversation. Re-subscribing to an already
/// forwarded id is a no-op.
fn subscribe(
    state: &AppState,
    tx: &mpsc::Sender<Message>,
    forwarders: &mut HashMap<Uuid, JoinHandle<()>>,
    conversation_id: Uuid,
) {
    if forwarders.contains_key(&conversation_id) {
        return;
    }

    let session = state.chats.get_or_create(conversation_id);
    let queue = session.queue();
    let tx = tx.clone();
    let handle = tokio::spawn(async move {
        loop {
            let event = queue.recv().await;
            // Terminal events do not end the forwarder here: a later run
            // on the same conversation keeps streaming to this socket.
            let payload = events::with_conversation_id(&event, conversation_id);
            if tx
                .send(Message::Text(payload.to_string().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });
    forwarders.insert(conversation_id, handle);
    debug!("subscribed to conversation {conversation_id}");
}

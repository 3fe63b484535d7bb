//! API request handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::Part;
use crate::chat::StartOptions;
use crate::conversation::{Conversation, ConversationRepository, MessageView};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Authn/authz is out of scope for this service; callers identify
/// themselves with a header, defaulting to the local user.
const USER_HEADER: &str = "x-user-id";
const DEFAULT_USER: &str = "local";

fn caller(headers: &HeaderMap) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_USER)
        .to_string()
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    pub conversation_id: Uuid,
}

/// Structured input content for a chat turn. Same tagged wire shape as
/// the stored parts.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InputContent {
    Text { text: String },
    ImageUrl { url: String },
    AudioUrl { url: String },
    DocumentUrl { url: String },
    Binary { media_type: String, data: String },
}

impl From<InputContent> for Part {
    fn from(content: InputContent) -> Self {
        match content {
            InputContent::Text { text } => Part::Text { text },
            InputContent::ImageUrl { url } => Part::ImageUrl { url },
            InputContent::AudioUrl { url } => Part::AudioUrl { url },
            InputContent::DocumentUrl { url } => Part::DocumentUrl { url },
            InputContent::Binary { media_type, data } => Part::Binary { media_type, data },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub content: Vec<InputContent>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatStatusResponse {
    pub status: &'static str,
    pub conversation_id: Uuid,
}

/// Start a run in the background and return immediately; the stream is
/// carried by the WebSocket surfaces, not this response.
///
/// POST /chats/chat?conversation_id=...
pub async fn start_chat(
    State(state): State<AppState>,
    Query(query): Query<ConversationQuery>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.content.is_empty() {
        return Err(ApiError::bad_request("content must not be empty"));
    }

    let user_id = caller(&headers);
    let conversation_id = query.conversation_id;

    let repo = ConversationRepository::new(&state.db);
    repo.get_or_create(
        conversation_id,
        &user_id,
        request.title.as_deref(),
        request.model.as_deref(),
    )
    .await?;

    let parts: Vec<Part> = request.content.into_iter().map(Part::from).collect();
    let options = StartOptions {
        model: request.model,
        title: request.title,
    };

    let session = state.chats.get_or_create(conversation_id);
    let started = session.start(&user_id, parts, options).await;

    let status = if started { "started" } else { "already_running" };
    Ok((
        StatusCode::ACCEPTED,
        Json(ChatStatusResponse {
            status,
            conversation_id,
        }),
    ))
}

/// Stop a running session.
///
/// POST /chats/chat/stop?conversation_id=...
pub async fn stop_chat(
    State(state): State<AppState>,
    Query(query): Query<ConversationQuery>,
) -> ApiResult<Json<ChatStatusResponse>> {
    let conversation_id = query.conversation_id;
    let stopped = match state.chats.get(conversation_id) {
        Some(session) => session.stop().await,
        None => false,
    };

    let status = if stopped { "stopped" } else { "not_running" };
    Ok(Json(ChatStatusResponse {
        status,
        conversation_id,
    }))
}

#[derive(Debug, Serialize)]
pub struct RunningResponse {
    pub running: Vec<Uuid>,
}

/// Conversation ids with a session currently running.
///
/// GET /chats/running
pub async fn list_running(State(state): State<AppState>) -> Json<RunningResponse> {
    Json(RunningResponse {
        running: state.chats.list_running().await,
    })
}

/// List the caller's conversations.
///
/// GET /chats/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Conversation>>> {
    let repo = ConversationRepository::new(&state.db);
    let conversations = repo.list_for_user(&caller(&headers)).await?;
    Ok(Json(conversations))
}

/// Ordered message history for one conversation, parts decoded.
///
/// GET /chats/conversations/{conversation_id}/messages
pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<Vec<MessageView>>> {
    let repo = ConversationRepository::new(&state.db);
    if repo.get(conversation_id).await?.is_none() {
        return Err(ApiError::not_found(format!(
            "conversation not found: {conversation_id}"
        )));
    }

    let mut messages = Vec::new();
    for row in repo.list_messages(conversation_id).await? {
        messages.push(row.decode()?);
    }
    Ok(Json(messages))
}

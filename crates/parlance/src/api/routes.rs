//! API route definitions.

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::chat::ws;

use super::handlers;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(handlers::health))
        // Chat lifecycle
        .route("/chats/chat", post(handlers::start_chat))
        .route("/chats/chat/stop", post(handlers::stop_chat))
        .route("/chats/running", get(handlers::list_running))
        // Conversation history
        .route("/chats/conversations", get(handlers::list_conversations))
        .route(
            "/chats/conversations/{conversation_id}/messages",
            get(handlers::list_messages),
        )
        // Event streams
        .route("/chats/ws", get(ws::ws_conversation))
        .route("/chats/ws-all", get(ws::ws_conversations))
        .layer(trace_layer)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

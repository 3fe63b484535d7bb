//! Process-wide session registry.
//!
//! Owned by the application state and injected into handlers; sessions are
//! created lazily and live for the process lifetime (no eviction).

use std::sync::Arc;

use dashmap::DashMap;
use log::info;
use uuid::Uuid;

use super::session::{ChatDeps, ChatSession};

pub struct SessionRegistry {
    sessions: DashMap<Uuid, Arc<ChatSession>>,
    deps: Arc<ChatDeps>,
}

impl SessionRegistry {
    pub fn new(deps: ChatDeps) -> Self {
        Self {
            sessions: DashMap::new(),
            deps: Arc::new(deps),
        }
    }

    /// Get the session for a conversation, creating it on first use.
    /// Idempotent and concurrency-safe.
    pub fn get_or_create(&self, conversation_id: Uuid) -> Arc<ChatSession> {
        self.sessions
            .entry(conversation_id)
            .or_insert_with(|| {
                info!("creating session for conversation {conversation_id}");
                ChatSession::new(conversation_id, Arc::clone(&self.deps))
            })
            .clone()
    }

    pub fn get(&self, conversation_id: Uuid) -> Option<Arc<ChatSession>> {
        self.sessions
            .get(&conversation_id)
            .map(|entry| entry.value().clone())
    }

    /// Conversation ids with a run currently in flight.
    pub async fn list_running(&self) -> Vec<Uuid> {
        let sessions: Vec<(Uuid, Arc<ChatSession>)> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut running = Vec::new();
        for (id, session) in sessions {
            if session.is_running().await {
                running.push(id);
            }
        }
        running
    }
}

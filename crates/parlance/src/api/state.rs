//! Application state shared across handlers.

use std::sync::Arc;

use crate::agent::AgentRunner;
use crate::chat::{ChatDeps, SessionRegistry};
use crate::db::Database;
use crate::prompt::SystemPromptSource;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Conversation persistence.
    pub db: Database,
    /// Session registry: one live session per conversation, process-wide.
    pub chats: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(
        db: Database,
        runner: Arc<dyn AgentRunner>,
        prompts: Arc<dyn SystemPromptSource>,
    ) -> Self {
        let chats = SessionRegistry::new(ChatDeps {
            db: db.clone(),
            runner,
            prompts,
        });
        Self {
            db,
            chats: Arc::new(chats),
        }
    }
}

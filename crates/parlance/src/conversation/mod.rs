//! Conversation persistence: models and repository.

mod models;
mod repository;

pub use models::{Conversation, MessageRow, MessageView};
pub use repository::ConversationRepository;

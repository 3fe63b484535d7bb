//! Persisted conversation rows.

use anyhow::Result;
use serde::Serialize;
use sqlx::FromRow;

use crate::agent::{MessageKind, Part};
use crate::chat::codec;

/// A persisted conversation.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Conversation {
    pub id: String,
    pub title: Option<String>,
    pub user_id: String,
    /// Selected model identifier, if the user overrode the default.
    pub model: Option<String>,
    pub created_at: String,
}

/// One model request or response, as stored. `parts` is the tagged-JSON
/// encoding of the message's part list; rows are append-only.
#[derive(Debug, Clone, FromRow)]
pub struct MessageRow {
    pub id: i64,
    pub conversation_id: String,
    pub kind: String,
    pub parts: String,
    /// Creation time in epoch milliseconds; message order is creation
    /// order and is never renumbered.
    pub created_at: i64,
}

impl MessageRow {
    /// Decode the stored row into its API-facing view.
    pub fn decode(&self) -> Result<MessageView> {
        Ok(MessageView {
            id: self.id,
            kind: self.kind.parse()?,
            parts: codec::decode_parts(&self.parts)?,
            created_at: self.created_at,
        })
    }
}

/// A message row with its parts decoded.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: i64,
    pub kind: MessageKind,
    pub parts: Vec<Part>,
    pub created_at: i64,
}

//! Repository for conversation database operations.

use anyhow::{Context, Result};
use chrono::Utc;
use uuid::Uuid;

use crate::agent::{MessageKind, Part};
use crate::chat::codec;
use crate::db::Database;

use super::models::{Conversation, MessageRow};

/// Repository for conversation and message rows.
pub struct ConversationRepository<'a> {
    db: &'a Database,
}

impl<'a> ConversationRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    // ========== Conversation Operations ==========

    /// Get a conversation, creating the row if it does not exist yet.
    pub async fn get_or_create(
        &self,
        id: Uuid,
        user_id: &str,
        title: Option<&str>,
        model: Option<&str>,
    ) -> Result<Conversation> {
        sqlx::query(
            r#"
            INSERT INTO conversations (id, title, user_id, model)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(id.to_string())
        .bind(title)
        .bind(user_id)
        .bind(model)
        .execute(self.db.pool())
        .await
        .context("inserting conversation")?;

        self.get(id)
            .await?
            .context("conversation missing after insert")
    }

    /// Get a conversation by id.
    pub async fn get(&self, id: Uuid) -> Result<Option<Conversation>> {
        sqlx::query_as::<_, Conversation>(
            "SELECT id, title, user_id, model, created_at FROM conversations WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(self.db.pool())
        .await
        .context("fetching conversation")
    }

    /// List a user's conversations, newest first.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Conversation>> {
        sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, title, user_id, model, created_at
            FROM conversations
            WHERE user_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await
        .context("listing conversations")
    }

    // ========== Message Operations ==========

    /// Append one message row. Each driver pass creates new rows; rows are
    /// never rewritten.
    pub async fn append_message(
        &self,
        conversation_id: Uuid,
        kind: MessageKind,
        parts: &[Part],
    ) -> Result<MessageRow> {
        let encoded = codec::encode_parts(parts)?;
        let created_at = Utc::now().timestamp_millis();

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO messages (conversation_id, kind, parts, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(conversation_id.to_string())
        .bind(kind.as_str())
        .bind(&encoded)
        .bind(created_at)
        .fetch_one(self.db.pool())
        .await
        .context("inserting message")?;

        self.get_message(id).await
    }

    /// Get a message by id.
    pub async fn get_message(&self, id: i64) -> Result<MessageRow> {
        sqlx::query_as::<_, MessageRow>(
            "SELECT id, conversation_id, kind, parts, created_at FROM messages WHERE id = ?",
        )
        .bind(id)
        .fetch_one(self.db.pool())
        .await
        .context("fetching message")
    }

    /// List a conversation's messages in creation order.
    pub async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<MessageRow>> {
        sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, conversation_id, kind, parts, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(conversation_id.to_string())
        .fetch_all(self.db.pool())
        .await
        .context("listing messages")
    }

    /// Count messages in a conversation.
    pub async fn count_messages(&self, conversation_id: Uuid) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages WHERE conversation_id = ?")
            .bind(conversation_id.to_string())
            .fetch_one(self.db.pool())
            .await
            .context("counting messages")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> Database {
        Database::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_conversation_get_or_create_is_idempotent() {
        let db = setup().await;
        let repo = ConversationRepository::new(&db);
        let id = Uuid::new_v4();

        let first = repo
            .get_or_create(id, "alice", Some("Trip planning"), None)
            .await
            .unwrap();
        assert_eq!(first.user_id, "alice");
        assert_eq!(first.title.as_deref(), Some("Trip planning"));

        // A second call must not overwrite the existing row.
        let second = repo
            .get_or_create(id, "mallory", Some("Other"), Some("gpt-x"))
            .await
            .unwrap();
        assert_eq!(second.user_id, "alice");
        assert_eq!(second.title.as_deref(), Some("Trip planning"));
    }

    #[tokio::test]
    async fn test_messages_round_trip_in_creation_order() {
        let db = setup().await;
        let repo = ConversationRepository::new(&db);
        let id = Uuid::new_v4();
        repo.get_or_create(id, "alice", None, None).await.unwrap();

        repo.append_message(id, MessageKind::Request, &[Part::text("hi")])
            .await
            .unwrap();
        repo.append_message(id, MessageKind::Response, &[Part::text("hello")])
            .await
            .unwrap();

        let rows = repo.list_messages(id).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].kind, "request");
        assert_eq!(rows[1].kind, "response");

        let view = rows[1].decode().unwrap();
        assert_eq!(view.parts, vec![Part::text("hello")]);

        assert_eq!(repo.count_messages(id).await.unwrap(), 2);
    }
}

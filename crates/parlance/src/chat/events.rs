//! Wire event protocol for conversation streams.
//!
//! Every event a client sees is `{"type": <discriminator>, "data": ...}`.
//! The multiplexed socket additionally injects a top-level
//! `conversation_id` into each payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::agent::Part;

/// Events sent to clients over the conversation WebSockets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WireEvent {
    /// A new response part began streaming.
    PartStart { index: usize, part: Part },
    /// An unbuffered delta (reasoning text) for the part at `index`.
    PartDelta { index: usize, delta: String },
    /// The model called a tool.
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        arguments: Value,
    },
    /// A tool returned content.
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        content: String,
    },
    /// A boundary-safe batch of generated text.
    ContentChunk(String),
    /// The run completed normally.
    Done,
    /// The run was cancelled.
    Stopped,
    /// The run failed.
    Error { message: String },
    /// Acknowledgement of an inbound client frame.
    Ack,
}

impl WireEvent {
    /// Terminal events end a run's stream; the single-conversation socket
    /// closes after forwarding one.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WireEvent::Done | WireEvent::Stopped | WireEvent::Error { .. }
        )
    }
}

/// Serialize an event with a top-level `conversation_id` injected, as the
/// multiplexed socket requires.
pub fn with_conversation_id(event: &WireEvent, conversation_id: Uuid) -> Value {
    let mut value = serde_json::to_value(event).unwrap_or_else(|_| {
        serde_json::json!({"type": "error", "data": {"message": "unserializable event"}})
    });
    if let Some(object) = value.as_object_mut() {
        object.insert(
            "conversation_id".to_string(),
            Value::String(conversation_id.to_string()),
        );
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let event = WireEvent::ContentChunk("hello".to_string());
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "content_chunk");
        assert_eq!(value["data"], "hello");

        let done = serde_json::to_value(&WireEvent::Done).unwrap();
        assert_eq!(done["type"], "done");
    }

    #[test]
    fn test_terminal_classification() {
        assert!(WireEvent::Done.is_terminal());
        assert!(WireEvent::Stopped.is_terminal());
        assert!(WireEvent::Error {
            message: "boom".to_string()
        }
        .is_terminal());
        assert!(!WireEvent::Ack.is_terminal());
        assert!(!WireEvent::ContentChunk(String::new()).is_terminal());
    }

    #[test]
    fn test_conversation_id_injection() {
        let id = Uuid::new_v4();
        let value = with_conversation_id(&WireEvent::ContentChunk("hi".to_string()), id);
        assert_eq!(value["conversation_id"], id.to_string());
        assert_eq!(value["type"], "content_chunk");
    }
}

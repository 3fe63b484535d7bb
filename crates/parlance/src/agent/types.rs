//! Typed run-graph and message types shared by the agent interface, the
//! event codec, and the message store.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by an agent runner or its provider stream.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The model provider rejected or aborted the request.
    #[error("provider error: {0}")]
    Provider(String),

    /// A tool invocation failed in a way the agent could not recover from.
    #[error("tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A typed fragment of a persisted message.
///
/// Serializes as `{"type": ..., "data": {...}}` both in storage and on the
/// wire; decoding is the exact inverse of encoding for every variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Part {
    /// Plain generated or user-authored text.
    Text { text: String },
    /// Reasoning/thinking text.
    Thinking { text: String },
    /// A tool call issued by the model.
    ToolCall {
        tool_name: String,
        arguments: Value,
        tool_call_id: String,
    },
    /// The result returned by a tool, always stored as text.
    ToolResult {
        tool_name: String,
        content: String,
        tool_call_id: String,
    },
    /// System instructions.
    SystemPrompt { text: String },
    /// A retry/error prompt fed back to the model.
    RetryPrompt { text: String },
    ImageUrl { url: String },
    AudioUrl { url: String },
    DocumentUrl { url: String },
    /// Inline binary content, base64-encoded.
    Binary { media_type: String, data: String },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn system_prompt(text: impl Into<String>) -> Self {
        Part::SystemPrompt { text: text.into() }
    }
}

/// Whether a message was user-authored (a model request) or
/// assistant-authored (a model response).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Request,
    Response,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Request => "request",
            MessageKind::Response => "response",
        }
    }
}

impl std::str::FromStr for MessageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "request" => Ok(MessageKind::Request),
            "response" => Ok(MessageKind::Response),
            other => Err(anyhow::anyhow!("unknown message kind: {other}")),
        }
    }
}

/// One model request or response, as the agent library sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMessage {
    pub kind: MessageKind,
    pub parts: Vec<Part>,
}

impl ModelMessage {
    pub fn request(parts: Vec<Part>) -> Self {
        Self {
            kind: MessageKind::Request,
            parts,
        }
    }

    pub fn response(parts: Vec<Part>) -> Self {
        Self {
            kind: MessageKind::Response,
            parts,
        }
    }
}

/// A tool call as the provider surfaced it. `call_id` is the provider's
/// transient identifier and may be absent; the codec assigns the canonical
/// `tool_call_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallEvent {
    pub tool_name: String,
    pub arguments: Value,
    pub call_id: Option<String>,
}

/// A tool result as the provider surfaced it. `content` may be any JSON
/// value; the codec serializes non-textual content before it reaches the
/// wire or storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResultEvent {
    pub tool_name: String,
    pub content: Value,
    pub call_id: Option<String>,
}

/// A sub-event streamed while a run node executes.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// A new response part began at `index`.
    PartStart { index: usize, part: Part },
    /// A text delta for the part at `index`.
    TextDelta { index: usize, delta: String },
    /// A reasoning delta for the part at `index`.
    ThinkingDelta { index: usize, delta: String },
    /// The model announced a tool call.
    ToolCall(ToolCallEvent),
    /// A tool finished and returned content.
    ToolResult(ToolResultEvent),
}

/// Stream of sub-events for one run node.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<RunEvent, AgentError>> + Send>>;

/// Stream of graph nodes for one run.
pub type NodeStream = Pin<Box<dyn Stream<Item = Result<RunNode, AgentError>> + Send>>;

/// A step in the agent's execution graph.
pub enum RunNode {
    /// A model request: the message sent to the provider plus the streamed
    /// provider sub-events for its response.
    Request {
        message: ModelMessage,
        events: EventStream,
    },
    /// Tool execution for the preceding response: tool-call/tool-result
    /// sub-events, empty when the model called no tools.
    ToolExecution { events: EventStream },
    /// The run finished.
    End,
}

impl std::fmt::Debug for RunNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunNode::Request { message, .. } => f
                .debug_struct("Request")
                .field("message", message)
                .finish_non_exhaustive(),
            RunNode::ToolExecution { .. } => f.debug_struct("ToolExecution").finish_non_exhaustive(),
            RunNode::End => f.write_str("End"),
        }
    }
}

/// Per-run context handed to the agent runner.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// The authenticated user driving this run.
    pub user_id: String,
    pub conversation_id: Uuid,
    /// Model override for this conversation, if any.
    pub model: Option<String>,
    /// The current system prompt text, computed by the driver.
    pub system_prompt: String,
}

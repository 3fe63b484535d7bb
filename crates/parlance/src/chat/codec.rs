//! Event codec and tool-call identifier normalization.
//!
//! Storage and wire shapes are the same tagged JSON (`{"type", "data"}`),
//! so encoding a part list and decoding it back is lossless for every
//! variant. The codec also owns the per-run tool-call-id table: providers
//! surface tool calls with a stable id, a transient one, or none at all,
//! and every downstream consumer (wire events, persisted parts) must see
//! one canonical `tool_call_id` per call. The table is dropped with the
//! codec when the run ends.

use std::collections::{HashMap, VecDeque};

use anyhow::{Context, Result};
use serde_json::Value;
use uuid::Uuid;

use crate::agent::{Part, ToolCallEvent, ToolResultEvent};

use super::events::WireEvent;

/// Serialize a message's parts for storage.
pub fn encode_parts(parts: &[Part]) -> Result<String> {
    serde_json::to_string(parts).context("encoding message parts")
}

/// Decode a stored parts column back into typed parts.
pub fn decode_parts(raw: &str) -> Result<Vec<Part>> {
    serde_json::from_str(raw).context("decoding message parts")
}

/// Per-run codec state: provider call id -> canonical id, plus unanswered
/// calls per tool name for providers that never number their calls.
#[derive(Debug, Default)]
pub struct EventCodec {
    by_provider: HashMap<String, String>,
    pending: HashMap<String, VecDeque<String>>,
}

impl EventCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a tool-call event into a wire event and the part to
    /// persist. Returns new values; the provider's event is not touched.
    pub fn encode_tool_call(&mut self, event: &ToolCallEvent) -> (WireEvent, Part) {
        let tool_call_id = self.bind_call(&event.tool_name, event.call_id.as_deref());
        let wire = WireEvent::ToolCall {
            tool_call_id: tool_call_id.clone(),
            tool_name: event.tool_name.clone(),
            arguments: event.arguments.clone(),
        };
        let part = Part::ToolCall {
            tool_name: event.tool_name.clone(),
            arguments: event.arguments.clone(),
            tool_call_id,
        };
        (wire, part)
    }

    /// Normalize a tool-result event, resolving it to the id its call event
    /// used. Non-textual content is serialized to JSON text.
    pub fn encode_tool_result(&mut self, event: &ToolResultEvent) -> (WireEvent, Part) {
        let tool_call_id = self.resolve_result(&event.tool_name, event.call_id.as_deref());
        let content = render_content(&event.content);
        let wire = WireEvent::ToolResult {
            tool_call_id: tool_call_id.clone(),
            tool_name: event.tool_name.clone(),
            content: content.clone(),
        };
        let part = Part::ToolResult {
            tool_name: event.tool_name.clone(),
            content,
            tool_call_id,
        };
        (wire, part)
    }

    fn bind_call(&mut self, tool_name: &str, provider_id: Option<&str>) -> String {
        let canonical = match provider_id {
            Some(pid) if !pid.is_empty() => {
                // Stable provider ids pass through unchanged.
                self.by_provider.insert(pid.to_string(), pid.to_string());
                pid.to_string()
            }
            _ => fresh_call_id(),
        };
        self.pending
            .entry(tool_name.to_string())
            .or_default()
            .push_back(canonical.clone());
        canonical
    }

    fn resolve_result(&mut self, tool_name: &str, provider_id: Option<&str>) -> String {
        if let Some(pid) = provider_id.filter(|p| !p.is_empty()) {
            if let Some(canonical) = self.by_provider.get(pid).cloned() {
                if let Some(queue) = self.pending.get_mut(tool_name) {
                    queue.retain(|id| id != &canonical);
                }
                return canonical;
            }
            return pid.to_string();
        }

        // No id on the result: pair with the oldest unanswered call for
        // this tool. Each canonical id pairs at most once.
        self.pending
            .get_mut(tool_name)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(fresh_call_id)
    }
}

/// Tool-result content must be text on the wire. Serialization failure
/// falls back to a string coercion so a malformed payload never aborts a
/// live stream.
fn render_content(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn fresh_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

//! Execution driver: walks one agent run to completion or cancellation.
//!
//! For each graph node the driver persists the corresponding message row
//! and converts sub-events into wire events on the session queue. Request
//! messages are persisted before their streaming starts (partial histories
//! stay visible if the run later fails); response messages are persisted
//! after tool execution finishes, so the stored part list reflects the
//! completed tool calls. That asymmetry is load-bearing for resumed
//! conversations.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use log::debug;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent::{MessageKind, ModelMessage, Part, RunContext, RunEvent, RunNode};
use crate::conversation::ConversationRepository;

use super::chunker::ContentChunker;
use super::codec::{self, EventCodec};
use super::events::WireEvent;
use super::queue::EventQueue;
use super::session::{ChatDeps, StartOptions};

/// How a driver run ended. Failures are errors; cancellation is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

pub struct ExecutionDriver {
    deps: Arc<ChatDeps>,
    queue: Arc<EventQueue>,
    conversation_id: Uuid,
    user_id: String,
    options: StartOptions,
}

impl ExecutionDriver {
    pub fn new(
        deps: Arc<ChatDeps>,
        queue: Arc<EventQueue>,
        conversation_id: Uuid,
        user_id: String,
        options: StartOptions,
    ) -> Self {
        Self {
            deps,
            queue,
            conversation_id,
            user_id,
            options,
        }
    }

    /// Drive one full run. Cancellation is only observed between awaits,
    /// so an in-flight persistence write always completes before the run
    /// winds down.
    pub async fn run(self, input: Vec<Part>, cancel: CancellationToken) -> Result<RunOutcome> {
        let repo = ConversationRepository::new(&self.deps.db);
        let conversation = repo
            .get_or_create(
                self.conversation_id,
                &self.user_id,
                self.options.title.as_deref(),
                self.options.model.as_deref(),
            )
            .await?;

        let mut history = Vec::with_capacity(8);
        for row in repo.list_messages(self.conversation_id).await? {
            let kind: MessageKind = row.kind.parse()?;
            let parts = codec::decode_parts(&row.parts)
                .with_context(|| format!("decoding message {}", row.id))?;
            history.push(ModelMessage { kind, parts });
        }

        let system_prompt = self.deps.prompts.system_prompt(&self.user_id).await?;
        // Resumed conversations get the freshly computed prompt so system
        // instructions stay current across turns.
        if let Some(first) = history.first_mut() {
            rewrite_system_prompt(first, &system_prompt);
        }

        let ctx = RunContext {
            user_id: self.user_id.clone(),
            conversation_id: self.conversation_id,
            model: self.options.model.clone().or(conversation.model.clone()),
            system_prompt,
        };

        let mut nodes = self.deps.runner.run(ctx, input, history).await?;

        let mut chunker = ContentChunker::new();
        let mut event_codec = EventCodec::new();
        let mut response = ResponseParts::default();

        loop {
            let node = tokio::select! {
                _ = cancel.cancelled() => return Ok(self.wind_down(&mut chunker)),
                next = nodes.next() => match next {
                    Some(node) => node?,
                    None => break,
                },
            };

            match node {
                RunNode::Request { message, mut events } => {
                    debug!(
                        "persisting request for conversation {} ({} parts)",
                        self.conversation_id,
                        message.parts.len()
                    );
                    repo.append_message(self.conversation_id, MessageKind::Request, &message.parts)
                        .await?;

                    loop {
                        let event = tokio::select! {
                            _ = cancel.cancelled() => return Ok(self.wind_down(&mut chunker)),
                            next = events.next() => match next {
                                Some(event) => event?,
                                None => break,
                            },
                        };
                        self.handle_event(event, &mut chunker, &mut event_codec, &mut response);
                    }
                }
                RunNode::ToolExecution { mut events } => {
                    loop {
                        let event = tokio::select! {
                            _ = cancel.cancelled() => return Ok(self.wind_down(&mut chunker)),
                            next = events.next() => match next {
                                Some(event) => event?,
                                None => break,
                            },
                        };
                        self.handle_event(event, &mut chunker, &mut event_codec, &mut response);
                    }

                    let parts = response.take();
                    if !parts.is_empty() {
                        repo.append_message(self.conversation_id, MessageKind::Response, &parts)
                            .await?;
                    }
                }
                RunNode::End => break,
            }
        }

        if let Some(chunk) = chunker.finish() {
            self.queue.push(WireEvent::ContentChunk(chunk));
        }
        // A runner that ends without a trailing tool-execution node still
        // gets its streamed response persisted.
        let leftover = response.take();
        if !leftover.is_empty() {
            repo.append_message(self.conversation_id, MessageKind::Response, &leftover)
                .await?;
        }

        self.queue.push(WireEvent::Done);
        Ok(RunOutcome::Completed)
    }

    /// Cancellation path: flush residual buffered text, then let `stop()`
    /// emit the terminal `stopped` once the task is awaited.
    fn wind_down(&self, chunker: &mut ContentChunker) -> RunOutcome {
        if let Some(chunk) = chunker.finish() {
            self.queue.push(WireEvent::ContentChunk(chunk));
        }
        RunOutcome::Cancelled
    }

    fn handle_event(
        &self,
        event: RunEvent,
        chunker: &mut ContentChunker,
        event_codec: &mut EventCodec,
        response: &mut ResponseParts,
    ) {
        match event {
            RunEvent::PartStart { index, part } => {
                self.queue.push(WireEvent::PartStart {
                    index,
                    part: part.clone(),
                });
                response.start(index, part);
            }
            // Generated text is re-batched by the chunker; everything else
            // goes out immediately, unbuffered.
            RunEvent::TextDelta { index, delta } => {
                response.append_text(index, &delta);
                if let Some(chunk) = chunker.push(&delta) {
                    self.queue.push(WireEvent::ContentChunk(chunk));
                }
            }
            RunEvent::ThinkingDelta { index, delta } => {
                response.append_thinking(index, &delta);
                self.queue.push(WireEvent::PartDelta { index, delta });
            }
            RunEvent::ToolCall(call) => {
                let (wire, part) = event_codec.encode_tool_call(&call);
                self.queue.push(wire);
                response.push(part);
            }
            RunEvent::ToolResult(result) => {
                let (wire, part) = event_codec.encode_tool_result(&result);
                self.queue.push(wire);
                response.push(part);
            }
        }
    }
}

/// Replace the first system-prompt part of a resumed conversation's first
/// message with the freshly computed text.
fn rewrite_system_prompt(message: &mut ModelMessage, prompt: &str) {
    for part in &mut message.parts {
        if let Part::SystemPrompt { text } = part {
            *text = prompt.to_string();
            return;
        }
    }
}

/// Accumulates the streamed response parts for persistence.
#[derive(Default)]
struct ResponseParts {
    parts: Vec<Part>,
    by_index: HashMap<usize, usize>,
}

impl ResponseParts {
    fn start(&mut self, index: usize, part: Part) {
        let pos = self.parts.len();
        self.parts.push(part);
        self.by_index.insert(index, pos);
    }

    fn append_text(&mut self, index: usize, delta: &str) {
        let pos = self.slot(index, || Part::text(""));
        if let Part::Text { text } = &mut self.parts[pos] {
            text.push_str(delta);
        } else {
            self.start(index, Part::text(delta));
        }
    }

    fn append_thinking(&mut self, index: usize, delta: &str) {
        let pos = self.slot(index, || Part::Thinking {
            text: String::new(),
        });
        if let Part::Thinking { text } = &mut self.parts[pos] {
            text.push_str(delta);
        } else {
            self.start(
                index,
                Part::Thinking {
                    text: delta.to_string(),
                },
            );
        }
    }

    fn push(&mut self, part: Part) {
        self.parts.push(part);
    }

    fn slot(&mut self, index: usize, make: impl FnOnce() -> Part) -> usize {
        if let Some(&pos) = self.by_index.get(&index) {
            return pos;
        }
        let pos = self.parts.len();
        self.parts.push(make());
        self.by_index.insert(index, pos);
        pos
    }

    /// Drain accumulated parts, dropping parts that never received any
    /// content.
    fn take(&mut self) -> Vec<Part> {
        self.by_index.clear();
        std::mem::take(&mut self.parts)
            .into_iter()
            .filter(|part| match part {
                Part::Text { text } | Part::Thinking { text } => !text.is_empty(),
                _ => true,
            })
            .collect()
    }
}

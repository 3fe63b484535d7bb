//! Scripted agent runner.
//!
//! Replays a fixed node script instead of calling a provider. Used by the
//! test suites and by local harnesses that need deterministic streams
//! (tool calls, slow runs, provider failures) without a model behind them.

use async_trait::async_trait;
use futures::{stream, StreamExt};

use super::types::{
    AgentError, EventStream, MessageKind, ModelMessage, NodeStream, Part, RunContext, RunEvent,
    RunNode,
};
use super::AgentRunner;

/// One step of a scripted run.
#[derive(Debug, Clone)]
pub enum ScriptNode {
    /// A request node with the message to persist and the provider
    /// sub-events to stream.
    Request {
        parts: Vec<Part>,
        events: Vec<RunEvent>,
    },
    /// A tool-execution node streaming the given sub-events.
    ToolExecution { events: Vec<RunEvent> },
    /// End the run normally.
    End,
    /// Fail the run with a provider error.
    Fail { message: String },
    /// Never yield another node; the run only ends via cancellation.
    Hang,
}

/// Runner that replays the same script on every run.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAgent {
    script: Vec<ScriptNode>,
}

impl ScriptedAgent {
    pub fn new(script: Vec<ScriptNode>) -> Self {
        Self { script }
    }

    /// A minimal script that streams `deltas` as one text part and ends.
    pub fn text_run(deltas: &[&str]) -> Self {
        let mut events = vec![RunEvent::PartStart {
            index: 0,
            part: Part::text(""),
        }];
        events.extend(deltas.iter().map(|delta| RunEvent::TextDelta {
            index: 0,
            delta: (*delta).to_string(),
        }));

        Self::new(vec![
            ScriptNode::Request {
                parts: vec![Part::text("scripted input")],
                events,
            },
            ScriptNode::ToolExecution { events: Vec::new() },
            ScriptNode::End,
        ])
    }
}

fn event_stream(events: Vec<RunEvent>) -> EventStream {
    Box::pin(stream::iter(events.into_iter().map(Ok)))
}

#[async_trait]
impl AgentRunner for ScriptedAgent {
    async fn run(
        &self,
        _ctx: RunContext,
        _input: Vec<Part>,
        _history: Vec<ModelMessage>,
    ) -> Result<NodeStream, AgentError> {
        let mut stages: Vec<NodeStream> = Vec::new();
        for node in self.script.clone() {
            let stage: NodeStream = match node {
                ScriptNode::Request { parts, events } => {
                    Box::pin(stream::iter(vec![Ok(RunNode::Request {
                        message: ModelMessage {
                            kind: MessageKind::Request,
                            parts,
                        },
                        events: event_stream(events),
                    })]))
                }
                ScriptNode::ToolExecution { events } => {
                    Box::pin(stream::iter(vec![Ok(RunNode::ToolExecution {
                        events: event_stream(events),
                    })]))
                }
                ScriptNode::End => Box::pin(stream::iter(vec![Ok(RunNode::End)])),
                ScriptNode::Fail { message } => {
                    Box::pin(stream::iter(vec![Err(AgentError::Provider(message))]))
                }
                ScriptNode::Hang => Box::pin(stream::pending()),
            };
            stages.push(stage);
        }

        Ok(Box::pin(stream::iter(stages).flatten()))
    }
}

//! Loopback agent runner for development.
//!
//! Streams the user's text back as the assistant response without calling a
//! model provider. Deployments plug a real provider integration in through
//! the [`AgentRunner`] trait; this keeps the full streaming pipeline
//! exercisable from a bare checkout.

use async_trait::async_trait;
use futures::stream;

use super::types::{
    AgentError, MessageKind, ModelMessage, NodeStream, Part, RunContext, RunEvent, RunNode,
};
use super::AgentRunner;

/// Development runner that echoes text input back as the response.
#[derive(Debug, Default, Clone)]
pub struct EchoAgent;

impl EchoAgent {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AgentRunner for EchoAgent {
    async fn run(
        &self,
        ctx: RunContext,
        input: Vec<Part>,
        history: Vec<ModelMessage>,
    ) -> Result<NodeStream, AgentError> {
        let mut request_parts = Vec::new();
        if history.is_empty() {
            request_parts.push(Part::system_prompt(ctx.system_prompt.clone()));
        }
        request_parts.extend(input.iter().cloned());

        let reply = input
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        let events = vec![
            Ok(RunEvent::PartStart {
                index: 0,
                part: Part::text(""),
            }),
            Ok(RunEvent::TextDelta {
                index: 0,
                delta: reply,
            }),
        ];

        let nodes = vec![
            Ok(RunNode::Request {
                message: ModelMessage {
                    kind: MessageKind::Request,
                    parts: request_parts,
                },
                events: Box::pin(stream::iter(events)),
            }),
            Ok(RunNode::ToolExecution {
                events: Box::pin(stream::iter(Vec::new())),
            }),
            Ok(RunNode::End),
        ];

        Ok(Box::pin(stream::iter(nodes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_echo_run_shape() {
        let runner = EchoAgent::new();
        let ctx = RunContext {
            user_id: "dev".to_string(),
            conversation_id: Uuid::new_v4(),
            model: None,
            system_prompt: "You are helpful.".to_string(),
        };

        let mut nodes = runner
            .run(ctx, vec![Part::text("hello")], Vec::new())
            .await
            .unwrap();

        let first = nodes.next().await.unwrap().unwrap();
        match first {
            RunNode::Request { message, mut events } => {
                assert!(matches!(message.parts[0], Part::SystemPrompt { .. }));
                let mut text = String::new();
                while let Some(event) = events.next().await {
                    if let RunEvent::TextDelta { delta, .. } = event.unwrap() {
                        text.push_str(&delta);
                    }
                }
                assert_eq!(text, "hello");
            }
            other => panic!("expected request node, got {other:?}"),
        }

        assert!(matches!(
            nodes.next().await.unwrap().unwrap(),
            RunNode::ToolExecution { .. }
        ));
        assert!(matches!(nodes.next().await.unwrap().unwrap(), RunNode::End));
    }
}

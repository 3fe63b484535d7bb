//! Agent runner interface.
//!
//! The language-model agent itself is an external collaborator: this module
//! defines the typed run graph the streaming engine consumes (nodes and
//! sub-events) and the [`AgentRunner`] trait a provider integration
//! implements. The built-in [`EchoAgent`] is a loopback runner used for
//! development and smoke testing.

mod echo;
mod scripted;
mod types;

pub use echo::EchoAgent;
pub use scripted::{ScriptNode, ScriptedAgent};
pub use types::{
    AgentError, EventStream, MessageKind, ModelMessage, NodeStream, Part, RunContext, RunEvent,
    RunNode, ToolCallEvent, ToolResultEvent,
};

use async_trait::async_trait;

/// Drives one agent run for a single user turn.
///
/// A run is a stream of graph nodes: each model request node carries the
/// request message plus a stream of provider sub-events, each tool-execution
/// node carries a stream of tool-call/tool-result sub-events, and the end
/// node terminates the run. Implementations yield a `ToolExecution` node
/// after every `Request` node (with an empty event stream when the model
/// called no tools) so the driver can persist the finished response.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Start a run with the given context, new user input, and decoded
    /// conversation history.
    async fn run(
        &self,
        ctx: RunContext,
        input: Vec<Part>,
        history: Vec<ModelMessage>,
    ) -> Result<NodeStream, AgentError>;
}

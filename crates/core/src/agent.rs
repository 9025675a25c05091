mod builder;
mod state;

use crate::gateway::{GatewayError, ModelGateway};
use crate::tool::{ToolDescriptor, ToolInvoker, ToolRegistry};
use crate::transcript::{Transcript, Turn};
pub use builder::AgentBuilder;
pub use state::AgentStage;

/// The default number of tool calls the agent makes for a single user
/// message before giving up.
pub const DEFAULT_MAX_TOOL_ITERATIONS: usize = 10;

/// Errors that end a turn without a text answer.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// The user message has no content.
    #[error("message must not be empty")]
    EmptyInput,
    /// The model couldn't produce a usable turn.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    /// The model kept calling tools without ever answering.
    #[error("gave up after {0} tool calls without an answer")]
    ToolIterationLimit(usize),
}

/// An agent, which owns a conversation and drives it between the user, the
/// model and the tools.
///
/// Each user message starts a turn. The agent keeps asking the model until
/// it answers with text, running every tool call the model makes in
/// between. All of it is recorded in the transcript, which is never
/// rewritten, even when a turn fails.
pub struct Agent {
    gateway: ModelGateway,
    invoker: ToolInvoker,
    registry: ToolRegistry,
    transcript: Transcript,
    stage: AgentStage,
    max_tool_iterations: usize,

    on_turn: Option<Box<dyn Fn(&Turn) + Send + Sync>>,
}

impl Agent {
    /// Returns the conversation so far.
    #[inline]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Returns what the agent is currently doing.
    #[inline]
    pub fn stage(&self) -> AgentStage {
        self.stage
    }

    /// Returns the tools offered to the model.
    #[inline]
    pub fn tools(&self) -> &[ToolDescriptor] {
        self.registry.list()
    }
}

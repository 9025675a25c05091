//! Core logic of the agent: the transcript, the model gateway, tool calls
//! and the orchestration loop between them.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
mod gateway;
pub mod tool;
pub mod transcript;

pub use agent::{
    Agent, AgentBuilder, AgentStage, DEFAULT_MAX_TOOL_ITERATIONS, TurnError,
};
pub use gateway::{GatewayError, ModelGateway, ModelTurn};

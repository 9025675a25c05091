//! Tool call supports.
//!
//! Tools live on an external tool server. The agent takes a snapshot of the
//! server's catalog once at startup ([`ToolRegistry`]) and forwards every
//! tool call the model makes to the server ([`ToolInvoker`]).

mod error;
mod invoker;
mod object;
mod registry;

use std::error::Error as StdError;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use toolbridge_model::ModelTool;

pub use error::{Error, ErrorKind};
pub use invoker::{ToolInvoker, ToolResult};
pub(crate) use object::{AnyToolServer, NoToolServer, ToolServerObject};
pub use registry::{RegistryError, ToolRegistry};

/// A tool's callable contract, as advertised by the tool server.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique name of the tool.
    pub name: String,
    /// Human and model facing summary.
    pub description: String,
    /// The arguments the tool accepts.
    pub parameter_schema: ParameterSchema,
}

/// The arguments a tool accepts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// JSON schemas of the parameters, keyed by parameter name.
    pub properties: Map<String, Value>,
    /// Names of the parameters that must be present.
    pub required: Vec<String>,
}

impl ToolDescriptor {
    /// Renders this descriptor as a model tool declaration, whose
    /// parameters are a JSON schema of an object.
    pub fn to_model_tool(&self) -> ModelTool {
        ModelTool {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: json!({
                "type": "object",
                "properties": self.parameter_schema.properties,
                "required": self.parameter_schema.required,
            }),
        }
    }
}

/// One part of a tool's response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentPart {
    /// A textual part.
    Text(String),
    /// Anything else (images, audio, embedded resources, ...), identified
    /// by its type name.
    Other(String),
}

/// The raw response of a tool call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolCallOutput {
    /// The content parts, in the order the server returned them.
    pub content: Vec<ContentPart>,
    /// The server flagged the call as failed. The content then usually
    /// describes what went wrong.
    pub is_error: bool,
}

impl ToolCallOutput {
    /// A successful output made of a single text part.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            content: vec![ContentPart::Text(text.into())],
            is_error: false,
        }
    }

    /// Returns the first textual part.
    ///
    /// Only one textual payload is consumed per tool call. Non-textual parts
    /// are skipped, and textual parts after the first one are ignored.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|part| match part {
            ContentPart::Text(text) => Some(text.as_str()),
            ContentPart::Other(_) => None,
        })
    }
}

/// An external server that advertises tools and executes calls to them.
pub trait ToolServer: Send + Sync + 'static {
    /// The error type that may be returned by the server.
    type Error: StdError + Send + Sync + 'static;

    /// Returns the server's tool catalog.
    fn list_tools(
        &self,
    ) -> impl Future<Output = Result<Vec<ToolDescriptor>, Self::Error>> + Send;

    /// Calls the tool `name` with `arguments`.
    ///
    /// This method must return a future that is fully independent of `self`.
    /// Name resolution is up to the server; calling an unknown tool is an
    /// error the server reports.
    fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> impl Future<Output = Result<ToolCallOutput, Self::Error>> + Send + 'static;
}

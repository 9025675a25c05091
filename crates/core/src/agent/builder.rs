use std::sync::Arc;
use std::time::Duration;

use toolbridge_model::ModelProvider;

use super::{Agent, AgentStage, DEFAULT_MAX_TOOL_ITERATIONS};
use crate::gateway::ModelGateway;
use crate::tool::{
    AnyToolServer, NoToolServer, RegistryError, ToolInvoker, ToolRegistry,
    ToolServer, ToolServerObject,
};
use crate::transcript::{Transcript, Turn};

const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// [`Agent`] builder.
pub struct AgentBuilder {
    gateway: ModelGateway,
    tool_server: Arc<dyn ToolServerObject>,
    max_tool_iterations: usize,
    request_timeout: Option<Duration>,
    model_retries: u32,
    on_turn: Option<Box<dyn Fn(&Turn) + Send + Sync>>,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            gateway: ModelGateway::new(provider),
            tool_server: Arc::new(NoToolServer),
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            request_timeout: None,
            model_retries: 0,
            on_turn: None,
        }
    }

    /// Sets the server that provides and runs the tools.
    ///
    /// Without one, the agent offers no tools to the model.
    #[inline]
    pub fn with_tool_server<S: ToolServer>(mut self, server: S) -> Self {
        self.tool_server = Arc::new(AnyToolServer(server));
        self
    }

    /// Limits how many tools may run for a single user message. Zero
    /// means the default limit.
    #[inline]
    pub fn with_max_tool_iterations(mut self, limit: usize) -> Self {
        self.max_tool_iterations = if limit == 0 {
            DEFAULT_MAX_TOOL_ITERATIONS
        } else {
            limit
        };
        self
    }

    /// Gives up on model requests and tool calls that take longer than
    /// `timeout`.
    #[inline]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Retries rate-limited model requests up to `retries` times.
    #[inline]
    pub fn with_model_retries(mut self, retries: u32) -> Self {
        self.model_retries = retries;
        self
    }

    /// Attaches a callback to be invoked on every turn appended to the
    /// transcript.
    #[inline]
    pub fn on_turn(
        mut self,
        on_turn: impl Fn(&Turn) + Send + Sync + 'static,
    ) -> Self {
        self.on_turn = Some(Box::new(on_turn));
        self
    }

    /// Builds the agent.
    ///
    /// This fetches the tool catalog, which is the only time the agent
    /// lists the server's tools.
    pub async fn build(self) -> Result<Agent, RegistryError> {
        let Self {
            gateway,
            tool_server,
            max_tool_iterations,
            request_timeout,
            model_retries,
            on_turn,
        } = self;

        let registry = ToolRegistry::load_from(tool_server.as_ref()).await?;
        let gateway = gateway
            .with_retries(model_retries, DEFAULT_RETRY_INTERVAL)
            .with_timeout(request_timeout);
        let invoker =
            ToolInvoker::from_object(tool_server).with_timeout(request_timeout);

        Ok(Agent {
            gateway,
            invoker,
            registry,
            transcript: Transcript::new(),
            stage: AgentStage::default(),
            max_tool_iterations,
            on_turn,
        })
    }
}

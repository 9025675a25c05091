use toolbridge_core::tool::{RegistryError, ToolDescriptor};
use toolbridge_core::transcript::{Transcript, Turn};
use toolbridge_core::{Agent, AgentBuilder, TurnError};
use toolbridge_mcp::{Implementation, McpClient};
use toolbridge_openai_model::OpenAIProvider;

use crate::config::{AppConfig, ConfigError};

/// Errors that keep a session from starting.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// The configuration is incomplete or malformed.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The tool server can't be reached, or refused the handshake.
    #[error("failed to connect to the tool server: {0}")]
    ToolServer(#[from] toolbridge_mcp::Error),
    /// The tool catalog couldn't be fetched.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    config: AppConfig,
    on_turn: Option<Box<dyn Fn(&Turn) + Send + Sync>>,
}

impl SessionBuilder {
    /// Creates a session builder with the given configuration.
    #[inline]
    pub fn with_config(config: AppConfig) -> Self {
        Self {
            config,
            on_turn: None,
        }
    }

    /// Attaches a callback to be invoked on every turn of the conversation.
    #[inline]
    pub fn on_turn(
        mut self,
        on_turn: impl Fn(&Turn) + Send + Sync + 'static,
    ) -> Self {
        self.on_turn = Some(Box::new(on_turn));
        self
    }

    /// Connects to the tool server and builds a new session.
    pub async fn connect(self) -> Result<Session, BootstrapError> {
        let AppConfig {
            openai,
            mcp,
            max_tool_iterations,
            request_timeout,
            model_retries,
        } = self.config;

        let url = mcp.url().clone();
        let tool_server = McpClient::connect(mcp).await?;
        let server_info = tool_server.server_info().cloned();
        info!("connected to tool server at {url}");

        let mut agent_builder =
            AgentBuilder::with_model_provider(OpenAIProvider::new(openai))
                .with_tool_server(tool_server)
                .with_max_tool_iterations(max_tool_iterations)
                .with_model_retries(model_retries);
        if let Some(timeout) = request_timeout {
            agent_builder = agent_builder.with_request_timeout(timeout);
        }
        if let Some(on_turn) = self.on_turn {
            agent_builder = agent_builder.on_turn(on_turn);
        }
        let agent = agent_builder.build().await?;

        Ok(Session { agent, server_info })
    }
}

/// A chat session, like a window that displays messages and has a input box.
///
/// The session holds a fully configured agent that you can use directly, and
/// it is basically a wrapper around [`Agent`].
pub struct Session {
    agent: Agent,
    server_info: Option<Implementation>,
}

impl Session {
    /// Sends a message, returning the model's answer once every tool call
    /// it needed has run.
    #[inline]
    pub async fn send_message(
        &mut self,
        message: &str,
    ) -> Result<String, TurnError> {
        self.agent.send_message(message).await
    }

    /// Returns the tools offered by the server.
    #[inline]
    pub fn tools(&self) -> &[ToolDescriptor] {
        self.agent.tools()
    }

    /// Returns the conversation so far.
    #[inline]
    pub fn transcript(&self) -> &Transcript {
        self.agent.transcript()
    }

    /// Returns how the tool server introduced itself, if it did.
    #[inline]
    pub fn server_info(&self) -> Option<&Implementation> {
        self.server_info.as_ref()
    }
}


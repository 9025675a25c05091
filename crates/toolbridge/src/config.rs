use std::time::Duration;

use toolbridge_core::DEFAULT_MAX_TOOL_ITERATIONS;
use toolbridge_mcp::{McpConfig, McpConfigBuilder, ParseTransportKindError};
use toolbridge_openai_model::{OpenAIConfig, OpenAIConfigBuilder};

/// Errors from reading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} is not set")]
    Missing(&'static str),
    /// A numeric variable doesn't hold a number.
    #[error("{name} must be a non-negative integer, got {value:?}")]
    InvalidNumber {
        /// The variable name.
        name: &'static str,
        /// The offending value.
        value: String,
    },
    /// `MCP_TRANSPORT` names an unknown transport.
    #[error("MCP_TRANSPORT: {0}")]
    Transport(#[from] ParseTransportKindError),
    /// `MCP_SERVER_URL` is not a URL.
    #[error("MCP_SERVER_URL is not a valid URL: {0}")]
    ServerUrl(#[from] url::ParseError),
}

/// Everything needed to start a session.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// How to reach the model.
    pub openai: OpenAIConfig,
    /// How to reach the tool server.
    pub mcp: McpConfig,
    /// The most tool calls allowed for a single user message.
    pub max_tool_iterations: usize,
    /// How long a model request or tool call may take, if limited.
    pub request_timeout: Option<Duration>,
    /// How many times a rate-limited model request is retried.
    pub model_retries: u32,
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    ///
    /// Recognized variables are `OPENAI_API_KEY` (required),
    /// `OPENAI_BASE_URL`, `OPENAI_MODEL`, `MCP_SERVER_URL`, `MCP_TRANSPORT`,
    /// `TOOLBRIDGE_MAX_TOOL_ITERATIONS`, `TOOLBRIDGE_REQUEST_TIMEOUT_SECS`
    /// and `TOOLBRIDGE_MODEL_RETRIES`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let api_key =
            var("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;
        let mut openai = OpenAIConfigBuilder::with_api_key(api_key);
        if let Some(base_url) = var("OPENAI_BASE_URL") {
            openai = openai.with_base_url(base_url);
        }
        if let Some(model) = var("OPENAI_MODEL") {
            openai = openai.with_model(model);
        }

        let mut mcp = McpConfigBuilder::new();
        if let Some(url) = var("MCP_SERVER_URL") {
            mcp = mcp.with_url(url);
        }
        if let Some(transport) = var("MCP_TRANSPORT") {
            mcp = mcp.with_transport(transport.parse()?);
        }

        let number = |name: &'static str| -> Result<Option<u64>, ConfigError> {
            var(name)
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidNumber { name, value })
                })
                .transpose()
        };
        let max_tool_iterations = number("TOOLBRIDGE_MAX_TOOL_ITERATIONS")?
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_TOOL_ITERATIONS);
        let request_timeout = number("TOOLBRIDGE_REQUEST_TIMEOUT_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let model_retries = number("TOOLBRIDGE_MODEL_RETRIES")?
            .map(|n| n.min(u32::MAX as u64) as u32)
            .unwrap_or(0);

        Ok(Self {
            openai: openai.build(),
            mcp: mcp.build()?,
            max_tool_iterations,
            request_timeout,
            model_retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use toolbridge_mcp::TransportKind;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("OPENAI_API_KEY", "sk-test")]).unwrap();
        assert_eq!(config.openai.base_url(), "https://api.openai.com/v1");
        assert_eq!(config.mcp.url().as_str(), "http://localhost:3001/sse");
        assert_eq!(config.mcp.transport(), TransportKind::Sse);
        assert_eq!(config.max_tool_iterations, DEFAULT_MAX_TOOL_ITERATIONS);
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.model_retries, 0);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "http://localhost:11434/v1/"),
            ("OPENAI_MODEL", "llama3.2"),
            ("MCP_SERVER_URL", "http://localhost:8000/mcp"),
            ("TOOLBRIDGE_MAX_TOOL_ITERATIONS", "3"),
            ("TOOLBRIDGE_REQUEST_TIMEOUT_SECS", "30"),
            ("TOOLBRIDGE_MODEL_RETRIES", "2"),
        ])
        .unwrap();
        assert_eq!(config.openai.base_url(), "http://localhost:11434/v1");
        assert_eq!(config.openai.model(), "llama3.2");
        assert_eq!(config.mcp.transport(), TransportKind::StreamableHttp);
        assert_eq!(config.max_tool_iterations, 3);
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.model_retries, 2);
    }

    #[test]
    fn test_errors() {
        let err = config_from(&[("OPENAI_API_KEY", "  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("OPENAI_API_KEY")));

        let err = config_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("TOOLBRIDGE_MODEL_RETRIES", "many"),
        ])
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "TOOLBRIDGE_MODEL_RETRIES must be a non-negative integer, got \"many\""
        );

        let err = config_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("MCP_TRANSPORT", "carrier-pigeon"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Transport(_)));

        let err = config_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("MCP_SERVER_URL", "://nowhere"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::ServerUrl(_)));
    }
}

use std::fmt::{self, Display};
use std::str::FromStr;

use url::Url;

/// The server URL used when none is configured.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:3001/sse";

const DEFAULT_CLIENT_NAME: &str = "toolbridge";
const DEFAULT_CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// How the client talks to the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// The legacy HTTP+SSE transport: a long-lived event stream for
    /// responses, and a separate endpoint for requests.
    Sse,
    /// The Streamable HTTP transport: one POST per message.
    StreamableHttp,
}

impl TransportKind {
    /// Guesses the transport from the server URL. Paths ending in `/sse`
    /// use the legacy transport.
    pub fn infer(url: &Url) -> Self {
        if url.path().trim_end_matches('/').ends_with("/sse") {
            Self::Sse
        } else {
            Self::StreamableHttp
        }
    }
}

impl Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sse => write!(f, "sse"),
            Self::StreamableHttp => write!(f, "streamable-http"),
        }
    }
}

/// The transport name is not recognized.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown transport `{0}`, expected `sse` or `streamable-http`")]
pub struct ParseTransportKindError(String);

impl FromStr for TransportKind {
    type Err = ParseTransportKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sse" => Ok(Self::Sse),
            "streamable-http" | "streamable_http" | "http" => {
                Ok(Self::StreamableHttp)
            }
            _ => Err(ParseTransportKindError(s.to_owned())),
        }
    }
}

/// Builder for [`McpConfig`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct McpConfigBuilder {
    url: Option<String>,
    transport: Option<TransportKind>,
    client_name: Option<String>,
    client_version: Option<String>,
}

impl McpConfigBuilder {
    /// Creates a builder with default settings.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server URL.
    #[inline]
    pub fn with_url<S: Into<String>>(mut self, url: S) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Forces a transport instead of inferring it from the URL.
    #[inline]
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the name and version the client introduces itself with.
    #[inline]
    pub fn with_client_info<N, V>(mut self, name: N, version: V) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        self.client_name = Some(name.into());
        self.client_version = Some(version.into());
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> Result<McpConfig, url::ParseError> {
        let url = Url::parse(self.url.as_deref().unwrap_or(DEFAULT_SERVER_URL))?;
        let transport = self
            .transport
            .unwrap_or_else(|| TransportKind::infer(&url));
        Ok(McpConfig {
            url,
            transport,
            client_name: self
                .client_name
                .unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_owned()),
            client_version: self
                .client_version
                .unwrap_or_else(|| DEFAULT_CLIENT_VERSION.to_owned()),
        })
    }
}

/// Where the tool server is, and how to reach it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct McpConfig {
    pub(crate) url: Url,
    pub(crate) transport: TransportKind,
    pub(crate) client_name: String,
    pub(crate) client_version: String,
}

impl McpConfig {
    /// Returns the server URL.
    #[inline]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the transport in use.
    #[inline]
    pub fn transport(&self) -> TransportKind {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = McpConfigBuilder::new().build().unwrap();
        assert_eq!(config.url().as_str(), DEFAULT_SERVER_URL);
        assert_eq!(config.transport(), TransportKind::Sse);
        assert_eq!(config.client_name, "toolbridge");
    }

    #[test]
    fn test_transport_inference() {
        let config = McpConfigBuilder::new()
            .with_url("http://localhost:8000/mcp")
            .build()
            .unwrap();
        assert_eq!(config.transport(), TransportKind::StreamableHttp);

        let config = McpConfigBuilder::new()
            .with_url("https://tools.example.com/v1/sse/")
            .build()
            .unwrap();
        assert_eq!(config.transport(), TransportKind::Sse);

        let config = McpConfigBuilder::new()
            .with_url("http://localhost:8000/mcp")
            .with_transport(TransportKind::Sse)
            .build()
            .unwrap();
        assert_eq!(config.transport(), TransportKind::Sse);
    }

    #[test]
    fn test_parse_transport_kind() {
        assert_eq!("SSE".parse(), Ok(TransportKind::Sse));
        assert_eq!(
            "streamable-http".parse(),
            Ok(TransportKind::StreamableHttp)
        );
        assert!("websocket".parse::<TransportKind>().is_err());
        assert!(McpConfigBuilder::new().with_url("not a url").build().is_err());
    }
}

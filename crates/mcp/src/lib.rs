//! A Model Context Protocol client, serving as the agent's tool server.
//!
//! The client connects once, performs the `initialize` handshake, and then
//! forwards `tools/list` and `tools/call` requests. Both the legacy
//! HTTP+SSE transport and Streamable HTTP are supported. The session itself
//! is run by `rmcp`.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
mod convert;
mod handler;
mod transport;

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::sync::Arc;

use reqwest::{Client, StatusCode};
use rmcp::model::{
    CallToolRequest, CallToolRequestParam, CancelledNotificationParam,
    ClientInfo, ClientRequest, PaginatedRequestParam, RequestId, ServerResult,
};
use rmcp::service::{
    ClientInitializeError, Peer, PeerRequestOptions, RunningService,
};
use rmcp::transport::IntoTransport;
use rmcp::{RoleClient, ServiceError};
use serde_json::Value;
use toolbridge_core::tool::{ToolCallOutput, ToolDescriptor, ToolServer};
use toolbridge_sse::SseError;
use url::Url;

pub use config::{
    DEFAULT_SERVER_URL, McpConfig, McpConfigBuilder, ParseTransportKindError,
    TransportKind,
};
pub use rmcp::model::Implementation;
use convert::{client_info, tool_descriptor, tool_output};
use handler::Handler;
use transport::{SseTransport, streamable_http};

/// Errors from talking to the tool server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The HTTP request failed.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered with a non-success status.
    #[error("server responded with {0}")]
    Status(StatusCode),
    /// The server answered with an unexpected body.
    #[error("unexpected content type: {0:?}")]
    ContentType(Option<String>),
    /// The event stream broke.
    #[error("event stream broken: {0}")]
    Stream(#[from] SseError),
    /// The endpoint URL is invalid.
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    /// The server asked to post messages to a different origin.
    #[error("refused endpoint on another origin: {0}")]
    ForeignEndpoint(Url),
    /// The event stream ended before the server named its endpoint.
    #[error("connection closed")]
    Closed,
    /// The handshake failed.
    #[error("handshake failed: {0}")]
    Initialize(#[from] ClientInitializeError),
    /// A request failed, or the server returned an error for it.
    #[error("request failed: {0}")]
    Service(#[from] ServiceError),
    /// The arguments for a tool call are not a JSON object.
    #[error("arguments for `{0}` must be an object")]
    InvalidArguments(String),
    /// The server answered with a result of the wrong kind.
    #[error("unexpected response from the server")]
    UnexpectedResponse,
}

/// A connected MCP client.
///
/// Clones share the same connection.
#[derive(Clone)]
pub struct McpClient {
    service: Arc<RunningService<RoleClient, Handler>>,
}

impl McpClient {
    /// Connects to the server and completes the handshake.
    pub async fn connect(config: McpConfig) -> Result<Self, Error> {
        debug!("connecting to {} over {}", config.url, config.transport);
        let info = client_info(&config);
        let client = Client::new();
        match config.transport {
            TransportKind::Sse => {
                let transport =
                    SseTransport::connect(client, config.url).await?;
                Self::serve(transport, info).await
            }
            TransportKind::StreamableHttp => {
                Self::serve(streamable_http(client, &config.url), info).await
            }
        }
    }

    pub(crate) async fn serve<T, E, A>(
        transport: T,
        info: ClientInfo,
    ) -> Result<Self, Error>
    where
        T: IntoTransport<RoleClient, E, A>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let service = rmcp::serve_client(Handler::new(info), transport).await?;
        if let Some(info) = service.peer().peer_info() {
            debug!(
                "connected to {} {}",
                info.server_info.name, info.server_info.version
            );
        }
        Ok(Self {
            service: Arc::new(service),
        })
    }

    /// Returns how the server introduced itself.
    #[inline]
    pub fn server_info(&self) -> Option<&Implementation> {
        self.service
            .peer()
            .peer_info()
            .map(|info| &info.server_info)
    }
}

impl ToolServer for McpClient {
    type Error = Error;

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, Self::Error> {
        let peer = self.service.peer();
        let mut tools = vec![];
        let mut seen = HashSet::new();
        let mut cursor = None;
        loop {
            let page = peer
                .list_tools(Some(PaginatedRequestParam {
                    cursor: cursor.clone(),
                }))
                .await?;
            tools.extend(page.tools.into_iter().map(tool_descriptor));
            match page.next_cursor {
                Some(next) if next.is_empty() => break,
                Some(next) if !seen.insert(next.clone()) => {
                    warn!("server repeated cursor `{next}`, stop listing");
                    break;
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(tools)
    }

    fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> impl Future<Output = Result<ToolCallOutput, Self::Error>> + Send + 'static
    {
        let peer = self.service.peer().clone();
        let name = name.to_owned();
        async move {
            let arguments = match arguments {
                Value::Object(map) => Some(map),
                Value::Null => None,
                _ => return Err(Error::InvalidArguments(name)),
            };
            let request = ClientRequest::CallToolRequest(CallToolRequest {
                method: Default::default(),
                params: CallToolRequestParam {
                    name: name.into(),
                    arguments,
                },
                extensions: Default::default(),
            });
            match send_request(&peer, request).await? {
                ServerResult::CallToolResult(result) => Ok(tool_output(result)),
                _ => Err(Error::UnexpectedResponse),
            }
        }
    }
}

/// Sends a request and waits for its result. The server is told to cancel
/// the request if the returned future is dropped before it completes.
async fn send_request(
    peer: &Peer<RoleClient>,
    request: ClientRequest,
) -> Result<ServerResult, Error> {
    let handle = peer
        .send_request_with_option(request, PeerRequestOptions::no_options())
        .await?;
    let mut pending = PendingRequest {
        peer: peer.clone(),
        id: Some(handle.id.clone()),
    };
    let result = handle.await_response().await;
    pending.id = None;
    Ok(result?)
}

/// A request still waiting for its response.
struct PendingRequest {
    peer: Peer<RoleClient>,
    id: Option<RequestId>,
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        let Some(request_id) = self.id.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        debug!("cancelling abandoned request {request_id:?}");
        let peer = self.peer.clone();
        runtime.spawn(async move {
            let params = CancelledNotificationParam {
                request_id,
                reason: Some("the caller stopped waiting".to_owned()),
            };
            if let Err(err) = peer.notify_cancelled(params).await {
                debug!("failed to cancel request: {err}");
            }
        });
    }
}

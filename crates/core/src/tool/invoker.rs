use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::object::{AnyToolServer, ToolServerObject};
use super::{Error, ToolServer};

/// The textual outcome of a successful tool call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolResult {
    text: String,
}

impl ToolResult {
    /// Returns the text the tool produced.
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consumes the result, returning its text.
    #[inline]
    pub fn into_text(self) -> String {
        self.text
    }
}

/// Forwards tool calls to the tool server and interprets the responses.
///
/// Clones share the same server connection.
#[derive(Clone)]
pub struct ToolInvoker {
    server: Arc<dyn ToolServerObject>,
    timeout: Option<Duration>,
}

impl ToolInvoker {
    /// Creates an invoker that calls tools on `server`.
    #[inline]
    pub fn new<S: ToolServer>(server: S) -> Self {
        Self::from_object(Arc::new(AnyToolServer(server)))
    }

    pub(crate) fn from_object(server: Arc<dyn ToolServerObject>) -> Self {
        Self {
            server,
            timeout: None,
        }
    }

    /// Gives up on calls that take longer than `timeout`.
    #[inline]
    pub fn with_timeout(self, timeout: Option<Duration>) -> Self {
        Self { timeout, ..self }
    }

    /// Calls the tool `name` with `arguments`.
    ///
    /// Exactly one request reaches the server per call, nothing is retried.
    /// Only the first textual part of the response is kept.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolResult, Error> {
        trace!("calling tool `{name}` with args: {arguments}");
        let fut = self.server.call_tool(name, arguments);
        let output_or_err = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(output_or_err) => output_or_err,
                Err(_) => {
                    return Err(Error::timeout().with_reason(format!(
                        "`{name}` didn't answer within {limit:?}"
                    )));
                }
            },
            None => fut.await,
        };
        let output = output_or_err.map_err(|err| {
            warn!("tool call `{name}` failed: {err}");
            Error::transport().with_reason(err.to_string())
        })?;

        let text = output.first_text();
        if output.is_error {
            let err = Error::tool_failed();
            return Err(match text {
                Some(text) if !text.is_empty() => err.with_reason(text),
                _ => err,
            });
        }
        match text {
            Some(text) if !text.is_empty() => Ok(ToolResult {
                text: text.to_owned(),
            }),
            _ => Err(Error::result_missing()),
        }
    }
}

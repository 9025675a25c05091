use std::error::Error as StdError;
use std::pin::Pin;

use serde_json::Value;

use super::{ToolCallOutput, ToolDescriptor, ToolServer};

pub(crate) type BoxedError = Box<dyn StdError + Send + Sync>;
type BoxedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe counterpart of [`ToolServer`], so that the agent doesn't
/// need a generic parameter for it.
pub(crate) trait ToolServerObject: Send + Sync + 'static {
    fn list_tools(
        &self,
    ) -> BoxedFuture<'_, Result<Vec<ToolDescriptor>, BoxedError>>;

    fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> BoxedFuture<'static, Result<ToolCallOutput, BoxedError>>;
}

pub(crate) struct AnyToolServer<S: ToolServer>(pub S);

impl<S: ToolServer> ToolServerObject for AnyToolServer<S> {
    #[inline]
    fn list_tools(
        &self,
    ) -> BoxedFuture<'_, Result<Vec<ToolDescriptor>, BoxedError>> {
        let fut = self.0.list_tools();
        Box::pin(async move { fut.await.map_err(BoxedError::from) })
    }

    #[inline]
    fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> BoxedFuture<'static, Result<ToolCallOutput, BoxedError>> {
        let fut = self.0.call_tool(name, arguments);
        Box::pin(async move { fut.await.map_err(BoxedError::from) })
    }
}

/// A server without any tools, used when the agent runs as a plain chat.
pub(crate) struct NoToolServer;

impl ToolServerObject for NoToolServer {
    fn list_tools(
        &self,
    ) -> BoxedFuture<'_, Result<Vec<ToolDescriptor>, BoxedError>> {
        let result: Result<_, BoxedError> = Ok(vec![]);
        Box::pin(std::future::ready(result))
    }

    fn call_tool(
        &self,
        name: &str,
        _arguments: Value,
    ) -> BoxedFuture<'static, Result<ToolCallOutput, BoxedError>> {
        let message = format!("no tool server to run `{name}`");
        let result: Result<ToolCallOutput, BoxedError> = Err(message.into());
        Box::pin(std::future::ready(result))
    }
}

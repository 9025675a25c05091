use std::future::poll_fn;
use std::pin::Pin;
use std::task::{self, Poll};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::ModelProviderError;

/// A streamed answer from the model provider.
///
/// A response yields [`ModelResponseEvent`]s until it completes. Text
/// arrives in pieces, while tool calls are delivered whole, once their
/// arguments are fully known.
pub trait ModelResponse: Sized + Send + 'static {
    /// The error type that may be returned by the provider.
    type Error: ModelProviderError;

    /// Polls for the next event.
    ///
    /// Returns `Ok(None)` once the response is exhausted, and keeps
    /// returning it on later calls. An error ends the response.
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>>;
}

/// Waits for the next event of a pinned response.
pub async fn next_event<R: ModelResponse>(
    mut resp: Pin<&mut R>,
) -> Result<Option<ModelResponseEvent>, R::Error> {
    poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await
}

/// Why the model stopped producing output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFinishReason {
    /// It wants a tool to be called.
    ToolCalls,
    /// It has finished its answer.
    Stop,
}

/// A tool call requested by the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// The identifier the provider assigned to this call. May be empty for
    /// providers that don't number their calls.
    pub id: String,
    /// The tool to call.
    pub name: String,
    /// The arguments to pass to the tool.
    ///
    /// Well-formed requests carry a JSON object. Providers should pass
    /// through whatever they received otherwise, so that the agent can
    /// reject it.
    pub arguments: Value,
}

/// One step of a [`ModelResponse`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelResponseEvent {
    /// A piece of answer text.
    MessageDelta(String),
    /// A complete tool call.
    ToolCall(ToolCallRequest),
    /// The model is done; no more text or calls follow.
    Completed(ModelFinishReason),
}

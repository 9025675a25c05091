use std::pin::{Pin, pin};
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use backoff::future::retry;
use toolbridge_model::{
    ModelFinishReason, ModelProvider, ModelProviderError, ModelRequest,
    ModelResponseEvent, ToolCallRequest, next_event,
};
use tracing::Instrument;

use crate::tool::ToolDescriptor;
use crate::transcript::Turn;

type SendRequestResult = Result<ModelReply, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type HandlerFn =
    Arc<dyn Fn(ModelRequest) -> BoxedSendRequestFuture + Send + Sync>;

const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// What the model decided to do with its turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelTurn {
    /// Answer the user with text.
    Text(String),
    /// Call a tool. The arguments are always a JSON object.
    ToolCall(ToolCallRequest),
}

/// Errors that may occur while asking the model for its next turn.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The provider failed, after all retries were used up.
    #[error("model request failed: {0}")]
    Provider(Box<dyn ModelProviderError>),
    /// The model didn't finish its turn in time.
    #[error("model request timed out after {0:?}")]
    Timeout(Duration),
    /// The model produced neither text nor a tool call.
    #[error("model returned an empty turn")]
    EmptyTurn,
    /// The model called a tool with arguments that aren't a JSON object.
    #[error("model called `{tool}` with malformed arguments")]
    MalformedArguments {
        /// Name of the tool being called.
        tool: String,
    },
    /// The model called a tool without naming it.
    #[error("model called a tool without a name")]
    UnnamedToolCall,
}

impl GatewayError {
    /// Returns `true` if the provider answered, but the answer can't be
    /// understood as either text or a tool call.
    #[inline]
    pub fn is_protocol_ambiguity(&self) -> bool {
        matches!(
            self,
            Self::EmptyTurn
                | Self::MalformedArguments { .. }
                | Self::UnnamedToolCall
        )
    }
}

/// The only path from the agent to the model.
///
/// The gateway wraps a model provider in a type-erased interface, turns a
/// transcript into a provider request, and folds the streamed response into
/// exactly one [`ModelTurn`].
#[derive(Clone)]
pub struct ModelGateway {
    handler_fn: HandlerFn,
    retries: u32,
    retry_interval: Duration,
    timeout: Option<Duration>,
}

impl ModelGateway {
    /// Creates a gateway for `provider`, without retries and timeouts.
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelGateway` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = fut.await;
                    handle_response::<P>(resp_or_err).await
                }
                .instrument(trace_span!("model gateway req")),
            )
        });
        Self {
            handler_fn,
            retries: 0,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            timeout: None,
        }
    }

    /// Retries rate-limited requests up to `retries` times, with an
    /// exponential backoff starting at `interval`.
    #[inline]
    pub fn with_retries(self, retries: u32, interval: Duration) -> Self {
        Self {
            retries,
            retry_interval: interval,
            ..self
        }
    }

    /// Gives up on requests that take longer than `timeout`, including the
    /// time spent streaming the response.
    #[inline]
    pub fn with_timeout(self, timeout: Option<Duration>) -> Self {
        Self { timeout, ..self }
    }

    /// Asks the model for its next turn.
    ///
    /// The request carries every turn of `transcript` in order, and all
    /// `tools` as declarations. The transcript is never modified here.
    pub async fn generate(
        &self,
        transcript: &[Turn],
        tools: &[ToolDescriptor],
    ) -> Result<ModelTurn, GatewayError> {
        let req = ModelRequest {
            messages: transcript.iter().map(Turn::to_model_message).collect(),
            tools: tools.iter().map(ToolDescriptor::to_model_tool).collect(),
        };
        let reply = self.send_with_retries(req).await?;
        normalize(reply)
    }

    async fn send_with_retries(
        &self,
        req: ModelRequest,
    ) -> Result<ModelReply, GatewayError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.retry_interval)
            .with_max_elapsed_time(None)
            .build();
        let mut attempts = 0;
        retry(policy, || {
            attempts += 1;
            let attempt = attempts;
            let fut = self.send_once(req.clone());
            async move {
                match fut.await {
                    Err(GatewayError::Provider(err))
                        if err.kind().is_transient()
                            && attempt <= self.retries =>
                    {
                        warn!("attempt {attempt} failed, retrying: {err}");
                        Err(backoff::Error::transient(GatewayError::Provider(
                            err,
                        )))
                    }
                    other => other.map_err(backoff::Error::permanent),
                }
            }
        })
        .await
    }

    async fn send_once(
        &self,
        req: ModelRequest,
    ) -> Result<ModelReply, GatewayError> {
        let fut = (self.handler_fn)(req);
        let reply_or_err = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| GatewayError::Timeout(limit))?,
            None => fut.await,
        };
        reply_or_err.map_err(GatewayError::Provider)
    }
}

/// A completely received response from the model.
#[derive(Clone, Debug, Default)]
struct ModelReply {
    text: String,
    tool_calls: Vec<ToolCallRequest>,
    finish_reason: Option<ModelFinishReason>,
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(Box::new(err));
        }
    };

    let mut reply = ModelReply::default();

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event = match next_event(pinned_resp.as_mut()).await {
            Ok(event) => event,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(Box::new(err));
            }
        };

        let Some(event) = event else {
            break;
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(msg) => {
                reply.text.push_str(&msg);
            }
            ModelResponseEvent::ToolCall(req) => {
                reply.tool_calls.push(req);
            }
            ModelResponseEvent::Completed(reason) => {
                reply.finish_reason = Some(reason);
            }
        }
    }

    trace!("finished a request ({:?})", reply.finish_reason);

    Ok(reply)
}

/// Picks exactly one outcome out of a reply. A tool call always wins over
/// text, and only the first tool call is honored.
fn normalize(reply: ModelReply) -> Result<ModelTurn, GatewayError> {
    let ModelReply {
        text, tool_calls, ..
    } = reply;

    let extra_calls = tool_calls.len().saturating_sub(1);
    if let Some(call) = tool_calls.into_iter().next() {
        if extra_calls > 0 {
            warn!("model requested {extra_calls} more tool calls, ignored");
        }
        if call.name.is_empty() {
            return Err(GatewayError::UnnamedToolCall);
        }
        if !call.arguments.is_object() {
            return Err(GatewayError::MalformedArguments { tool: call.name });
        }
        if !text.is_empty() {
            debug!("text alongside the tool call is dropped: {text:?}");
        }
        return Ok(ModelTurn::ToolCall(call));
    }

    if text.is_empty() {
        return Err(GatewayError::EmptyTurn);
    }
    Ok(ModelTurn::Text(text))
}

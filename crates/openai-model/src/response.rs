use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use serde_json::{Map, Value};
use toolbridge_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};
use toolbridge_sse::Sse;

use crate::Error;
use crate::proto::{ChatCompletionChunk, ToolCall};

struct PartialState {
    sse: Sse,
    id: Option<String>,
    // Tool calls arrive in fragments, usually keyed by `index`, and are
    // only complete once the stream reports a finish reason.
    tool_calls: Vec<ToolCall>,
    // Events produced after the stream finished, waiting to be returned.
    pending_events: VecDeque<ModelResponseEvent>,
    finished: bool,
}

impl PartialState {
    fn finish(&mut self, finish_reason: Option<ModelFinishReason>) {
        self.finished = true;

        let mut tool_calls = std::mem::take(&mut self.tool_calls);
        tool_calls.sort_by_key(|t| t.index);
        let has_tool_calls = !tool_calls.is_empty();
        for tool_call in tool_calls {
            self.pending_events
                .push_back(ModelResponseEvent::ToolCall(into_request(tool_call)));
        }

        let finish_reason = finish_reason.unwrap_or(if has_tool_calls {
            ModelFinishReason::ToolCalls
        } else {
            ModelFinishReason::Stop
        });
        self.pending_events
            .push_back(ModelResponseEvent::Completed(finish_reason));
    }

    fn merge_tool_call(&mut self, tool_call: ToolCall) {
        let partial_tool_call = match tool_call.index {
            Some(index) => {
                self.tool_calls.iter_mut().find(|t| t.index == Some(index))
            }
            // Without an index, a fragment carrying both an id and a name
            // starts a new call. Anything else continues the last one.
            None if tool_call.id.is_some()
                && tool_call
                    .function
                    .as_ref()
                    .is_some_and(|f| f.name.is_some()) =>
            {
                None
            }
            None => self.tool_calls.last_mut(),
        };
        let Some(partial_tool_call) = partial_tool_call else {
            self.tool_calls.push(tool_call);
            return;
        };
        // Patch the partial tool call.
        if let Some(id) = tool_call.id {
            partial_tool_call.id.get_or_insert_default().push_str(&id);
        }
        let Some(function) = tool_call.function else {
            return;
        };
        match partial_tool_call.function {
            Some(ref mut partial_func) => {
                if let Some(name) = function.name {
                    partial_func.name.get_or_insert_default().push_str(&name);
                }
                if let Some(arguments) = function.arguments {
                    partial_func
                        .arguments
                        .get_or_insert_default()
                        .push_str(&arguments);
                }
            }
            None => partial_tool_call.function = Some(function),
        }
    }
}

fn into_request(tool_call: ToolCall) -> ToolCallRequest {
    let (name, raw_arguments) = match tool_call.function {
        Some(function) => (
            function.name.unwrap_or_default(),
            function.arguments.unwrap_or_default(),
        ),
        None => Default::default(),
    };
    // Models omit the arguments entirely for parameterless tools. Anything
    // that doesn't parse is passed through as a string for the caller to
    // reject.
    let arguments = if raw_arguments.trim().is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_str(&raw_arguments)
            .unwrap_or(Value::String(raw_arguments))
    };
    ToolCallRequest {
        id: tool_call.id.unwrap_or_default(),
        name,
        arguments,
    }
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    /// A streaming chat completion.
    pub struct OpenAIResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl OpenAIResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            id: None,
            tool_calls: Default::default(),
            pending_events: Default::default(),
            finished: false,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(mut partial_state: PartialState) -> NextEvent {
    // The order of events is important. Message deltas are emitted as soon as
    // they arrive, tool calls only after the stream finished, and the finish
    // reason last.
    if let Some(event) = partial_state.pending_events.pop_front() {
        return Ok((Some(event), partial_state));
    }
    if partial_state.finished {
        return Ok((None, partial_state));
    }

    loop {
        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                partial_state.finish(None);
                break;
            }
            Err(err) => {
                return Err(Error::new(format!("{err}"), ErrorKind::Other));
            }
        };
        trace!("got sse event: {}", sse_event.data);
        if sse_event.data == "[DONE]" {
            partial_state.finish(None);
            break;
        }

        let mut chunk =
            serde_json::from_str::<ChatCompletionChunk>(&sse_event.data)
                .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
        if partial_state.id.get_or_insert_with(|| chunk.id.clone()) != &chunk.id
        {
            return Err(Error::new("chunk id mismatch", ErrorKind::Other));
        };

        // Usage-only chunks carry no choices.
        let Some(choice) = chunk.choices.pop() else {
            continue;
        };

        if let Some(tool_calls) = choice.delta.tool_calls {
            for tool_call in tool_calls {
                partial_state.merge_tool_call(tool_call);
            }
        }

        if let Some(finish_reason) = choice.finish_reason {
            let finish_reason = match finish_reason.as_str() {
                "tool_calls" => ModelFinishReason::ToolCalls,
                "content_filter" => {
                    return Err(Error::new(
                        "response was filtered by the provider",
                        ErrorKind::Moderated,
                    ));
                }
                _ => ModelFinishReason::Stop,
            };
            partial_state.finish(Some(finish_reason));
            // A final chunk may still carry text, which goes out first.
            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty())
            {
                return Ok((
                    Some(ModelResponseEvent::MessageDelta(content)),
                    partial_state,
                ));
            }
            break;
        }

        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            return Ok((
                Some(ModelResponseEvent::MessageDelta(content)),
                partial_state,
            ));
        }
    }

    let event = partial_state.pending_events.pop_front();
    Ok((event, partial_state))
}

use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::{poll_fn, ready};
use std::pin::Pin;
use std::task::{self, Poll};

use serde_json::json;
use toolbridge_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
    ModelTool, ToolCallRequest,
};

#[derive(Debug)]
struct KeywordModelError(ErrorKind);

impl Display for KeywordModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "keyword model failed: {}", self.0)
    }
}

impl Error for KeywordModelError {}

impl ModelProviderError for KeywordModelError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

struct KeywordModelResponse {
    events: VecDeque<ModelResponseEvent>,
}

impl ModelResponse for KeywordModelResponse {
    type Error = KeywordModelError;

    fn poll_next_event(
        mut self: Pin<&mut Self>,
        _cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        Poll::Ready(Ok(self.events.pop_front()))
    }
}

/// Calls the first advertised tool whenever the last user message mentions
/// it, and echoes the message otherwise.
struct KeywordModelProvider;

impl ModelProvider for KeywordModelProvider {
    type Error = KeywordModelError;
    type Response = KeywordModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let last_user = req.messages.iter().rev().find_map(|msg| match msg {
            ModelMessage::User(text) => Some(text.clone()),
            ModelMessage::Assistant(_) => None,
        });
        let Some(last_user) = last_user else {
            return ready(Err(KeywordModelError(ErrorKind::Other)));
        };

        let mut events = VecDeque::new();
        match req.tools.iter().find(|t| last_user.contains(&t.name)) {
            Some(tool) => {
                events.push_back(ModelResponseEvent::ToolCall(
                    ToolCallRequest {
                        id: "call_0".to_owned(),
                        name: tool.name.clone(),
                        arguments: json!({}),
                    },
                ));
                events.push_back(ModelResponseEvent::Completed(
                    ModelFinishReason::ToolCalls,
                ));
            }
            None => {
                for word in last_user.split_inclusive(' ') {
                    events.push_back(ModelResponseEvent::MessageDelta(
                        word.to_owned(),
                    ));
                }
                events.push_back(ModelResponseEvent::Completed(
                    ModelFinishReason::Stop,
                ));
            }
        }
        ready(Ok(KeywordModelResponse { events }))
    }
}

async fn collect(
    mut resp: KeywordModelResponse,
) -> (String, Vec<ToolCallRequest>, Option<ModelFinishReason>) {
    let mut text = String::new();
    let mut tool_calls = vec![];
    let mut finish_reason = None;
    while let Some(event) =
        poll_fn(|cx| Pin::new(&mut resp).poll_next_event(cx))
            .await
            .unwrap()
    {
        match event {
            ModelResponseEvent::MessageDelta(delta) => text.push_str(&delta),
            ModelResponseEvent::ToolCall(req) => tool_calls.push(req),
            ModelResponseEvent::Completed(reason) => {
                finish_reason = Some(reason)
            }
        }
    }
    (text, tool_calls, finish_reason)
}

fn roll_die_tool() -> ModelTool {
    ModelTool {
        name: "roll_die".to_owned(),
        description: "Rolls a six-sided die".to_owned(),
        parameters: json!({ "type": "object", "properties": {} }),
    }
}

#[tokio::test]
async fn test_text_response() {
    let req = ModelRequest {
        messages: vec![ModelMessage::User("What is 2+2?".to_owned())],
        tools: vec![roll_die_tool()],
    };
    let resp = KeywordModelProvider.send_request(&req).await.unwrap();
    let (text, tool_calls, finish_reason) = collect(resp).await;
    assert_eq!(text, "What is 2+2?");
    assert!(tool_calls.is_empty());
    assert_eq!(finish_reason, Some(ModelFinishReason::Stop));
}

#[tokio::test]
async fn test_tool_call_response() {
    let req = ModelRequest {
        messages: vec![
            ModelMessage::User("hello".to_owned()),
            ModelMessage::Assistant("hello".to_owned()),
            ModelMessage::User("please roll_die".to_owned()),
        ],
        tools: vec![roll_die_tool()],
    };
    let resp = KeywordModelProvider.send_request(&req).await.unwrap();
    let (text, tool_calls, finish_reason) = collect(resp).await;
    assert!(text.is_empty());
    assert_eq!(tool_calls.len(), 1);
    assert_eq!(tool_calls[0].name, "roll_die");
    assert_eq!(finish_reason, Some(ModelFinishReason::ToolCalls));
}

#[tokio::test]
async fn test_error() {
    let req = ModelRequest {
        messages: vec![],
        tools: vec![],
    };
    let err = KeywordModelProvider.send_request(&req).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Other);
    assert!(!err.kind().is_transient());
}

//! A local fake model for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::time::{Sleep, sleep};
use toolbridge_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    events: VecDeque<ModelResponseEvent>,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl TestModelResponse {
    fn from_preset(preset: &PresetResponse, delay: Duration) -> Self {
        let mut events: VecDeque<_> = preset
            .events
            .iter()
            .map(|event| match event {
                PresetEvent::MessageDelta(msg) => {
                    ModelResponseEvent::MessageDelta(msg.clone())
                }
                PresetEvent::ToolCall(req) => {
                    ModelResponseEvent::ToolCall(req.clone())
                }
            })
            .collect();
        events.push_back(ModelResponseEvent::Completed(
            if preset.has_tool_call() {
                ModelFinishReason::ToolCalls
            } else {
                ModelFinishReason::Stop
            },
        ));
        Self {
            events,
            delay,
            sleep: None,
        }
    }
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        if this.events.is_empty() {
            // In case this method is called after completion.
            return Poll::Ready(Ok(None));
        }

        // Every event is delayed, like a slow network would do.
        let delay = this.delay;
        let sleep = this.sleep.get_or_insert_with(|| Box::pin(sleep(delay)));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;

        Poll::Ready(Ok(this.events.pop_front()))
    }
}

#[derive(Default)]
struct Script {
    responses: VecDeque<PresetResponse>,
    repeated: Option<PresetResponse>,
    failed_attempts: u64,
    requests: Vec<ModelRequest>,
}

impl Script {
    fn next_response(&mut self) -> Result<PresetResponse, Error> {
        let (preset, from_queue) = match self.responses.front() {
            Some(preset) => (preset.clone(), true),
            None => match &self.repeated {
                Some(preset) => (preset.clone(), false),
                None => {
                    return Err(Error {
                        message: "no enough steps",
                        kind: ErrorKind::Other,
                    });
                }
            },
        };

        let should_fail = match preset.failures {
            Some(0) => true,
            Some(failures) => self.failed_attempts < failures,
            None => false,
        };
        if should_fail {
            self.failed_attempts += 1;
            return Err(Error {
                message: "preset failure",
                kind: ErrorKind::RateLimitExceeded,
            });
        }

        self.failed_attempts = 0;
        if from_queue {
            self.responses.pop_front();
        }
        Ok(preset)
    }
}

/// A local fake model for testing purpose.
///
/// Responses are handed out in the order they were added, one per request,
/// regardless of what the request contains. Once the queue is drained, the
/// repeated response (if any) answers every further request; otherwise an
/// error is returned.
///
/// Clones share the same script, so a test can keep a clone around to
/// inspect the requests the agent sent.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    #[inline]
    pub fn add_response(&mut self, preset: PresetResponse) {
        self.script().responses.push_back(preset);
    }

    /// Answers every request with `preset` after the queued responses are
    /// used up.
    #[inline]
    pub fn repeat_response(&mut self, preset: PresetResponse) {
        self.script().repeated = Some(preset);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns all requests received so far, oldest first.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.script().requests.clone()
    }

    /// Returns the number of queued responses not yet handed out.
    pub fn remaining(&self) -> usize {
        self.script().responses.len()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let mut script = self.script();
        script.requests.push(req.clone());
        let delay = self.delay.unwrap_or(Duration::from_millis(1));
        let result = script
            .next_response()
            .map(|preset| TestModelResponse::from_preset(&preset, delay));
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use std::pin::pin;

    use serde_json::json;
    use toolbridge_model::{
        ModelMessage, ModelTool, ToolCallRequest, next_event,
    };

    use super::*;

    async fn collect_response(
        resp: TestModelResponse,
    ) -> (String, Option<ToolCallRequest>, Option<ModelFinishReason>) {
        let mut resp = pin!(resp);
        let mut msg = String::new();
        let mut tool_call = None;
        let mut finish_reason = None;
        while let Some(event) = next_event(resp.as_mut()).await.unwrap() {
            match event {
                ModelResponseEvent::Completed(reason) => {
                    finish_reason = Some(reason)
                }
                ModelResponseEvent::MessageDelta(delta) => {
                    msg.push_str(&delta);
                }
                ModelResponseEvent::ToolCall(req) => tool_call = Some(req),
            }
        }
        (msg, tool_call, finish_reason)
    }

    fn request(text: &str) -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::User(text.to_owned())],
            tools: vec![ModelTool {
                name: "roll_die".to_owned(),
                description: "Rolls a die".to_owned(),
                parameters: json!({ "type": "object", "properties": {} }),
            }],
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Hello, ".to_owned()),
            PresetEvent::MessageDelta("world!".to_owned()),
        ]));
        provider.add_response(PresetResponse::tool_call(
            "roll_die",
            json!({ "sides": 6 }),
        ));

        let resp = provider.send_request(&request("Hi")).await.unwrap();
        let (msg, tool_call, finish_reason) = collect_response(resp).await;
        assert_eq!(msg, "Hello, world!");
        assert!(tool_call.is_none());
        assert_eq!(finish_reason, Some(ModelFinishReason::Stop));

        let resp = provider.send_request(&request("Roll")).await.unwrap();
        let (msg, tool_call, finish_reason) = collect_response(resp).await;
        assert!(msg.is_empty());
        let tool_call = tool_call.unwrap();
        assert_eq!(tool_call.name, "roll_die");
        assert_eq!(tool_call.arguments, json!({ "sides": 6 }));
        assert_eq!(finish_reason, Some(ModelFinishReason::ToolCalls));

        assert_eq!(provider.requests().len(), 2);
        assert_eq!(provider.remaining(), 0);
        let err = provider.send_request(&request("More")).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[tokio::test]
    async fn test_failures_then_success() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::text("ok").with_failures(2));

        for _ in 0..2 {
            let err = provider.send_request(&request("Hi")).await.err().unwrap();
            assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        }
        let resp = provider.send_request(&request("Hi")).await.unwrap();
        assert_eq!(collect_response(resp).await.0, "ok");
    }

    #[tokio::test]
    async fn test_repeated_response() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::text("first"));
        provider.repeat_response(PresetResponse::text("again"));

        let mut texts = vec![];
        for _ in 0..3 {
            let resp = provider.send_request(&request("Hi")).await.unwrap();
            texts.push(collect_response(resp).await.0);
        }
        assert_eq!(texts, ["first", "again", "again"]);
    }
}

use toolbridge_model::ToolCallRequest;
use tracing::Instrument;

use super::{Agent, TurnError};
use crate::gateway::ModelTurn;
use crate::transcript::Turn;

/// What the agent is doing at the moment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AgentStage {
    /// Idle, waiting for the next user message.
    #[default]
    AwaitingUser,
    /// A request is in flight to the model.
    AwaitingModel,
    /// A tool call is in flight to the tool server.
    HandlingToolCall,
    /// The model's answer is being recorded.
    Responding,
}

enum Step {
    AwaitingModel,
    HandlingToolCall(ToolCallRequest),
    Responding(String),
}

impl Agent {
    /// Sends a user message, and drives the conversation until the model
    /// answers it with text.
    ///
    /// On success, the answer is returned and is also the last turn of the
    /// transcript. On failure, every turn recorded so far is kept, and the
    /// agent is ready for the next message either way.
    pub async fn send_message<S: Into<String>>(
        &mut self,
        input: S,
    ) -> Result<String, TurnError> {
        let input = input.into();
        if input.is_empty() {
            return Err(TurnError::EmptyInput);
        }
        self.record(Turn::user(input));

        let result = self
            .run_until_response()
            .instrument(debug_span!("turn"))
            .await;
        self.stage = AgentStage::AwaitingUser;
        if let Err(err) = &result {
            warn!("turn ended without an answer: {err}");
        }
        result
    }

    async fn run_until_response(&mut self) -> Result<String, TurnError> {
        let mut tool_calls = 0;
        let mut step = Step::AwaitingModel;
        loop {
            step = match step {
                Step::AwaitingModel => {
                    self.stage = AgentStage::AwaitingModel;
                    let turn = self
                        .gateway
                        .generate(self.transcript.snapshot(), self.registry.list())
                        .await?;
                    match turn {
                        ModelTurn::Text(text) => Step::Responding(text),
                        ModelTurn::ToolCall(call) => {
                            Step::HandlingToolCall(call)
                        }
                    }
                }
                Step::HandlingToolCall(call) => {
                    if tool_calls >= self.max_tool_iterations {
                        return Err(TurnError::ToolIterationLimit(tool_calls));
                    }
                    tool_calls += 1;
                    self.stage = AgentStage::HandlingToolCall;
                    self.handle_tool_call(call).await;
                    Step::AwaitingModel
                }
                Step::Responding(text) => {
                    self.stage = AgentStage::Responding;
                    self.record(Turn::assistant(text.clone()));
                    return Ok(text);
                }
            };
        }
    }

    async fn handle_tool_call(&mut self, call: ToolCallRequest) {
        let ToolCallRequest {
            id,
            name,
            arguments,
        } = call;
        if self.registry.get(&name).is_none() {
            // The server is the judge of what it can run.
            warn!("model called `{name}`, which the server didn't list");
        }
        debug!("running tool `{name}` ({id})");

        self.record(Turn::tool_call(&name));
        let turn = match self.invoker.invoke(&name, arguments).await {
            Ok(result) => Turn::tool_result(result.into_text()),
            Err(err) => {
                warn!("tool `{name}` failed: {err}");
                Turn::tool_error(err.to_string())
            }
        };
        self.record(turn);
    }

    fn record(&mut self, turn: Turn) {
        match self.transcript.append(turn) {
            Ok(turn) => {
                if let Some(on_turn) = &self.on_turn {
                    on_turn(turn);
                }
            }
            Err(err) => error!("turn is not recorded: {err}"),
        }
    }
}

//! The conversation transcript.

use serde::{Deserialize, Serialize};
use toolbridge_model::ModelMessage;

/// Who a turn is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human, or a tool result relayed on their behalf.
    User,
    /// The model.
    Assistant,
}

/// What a turn's content is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    /// Plain text typed by the user or answered by the model.
    Message,
    /// The assistant announcing which tool it is calling.
    ToolCall,
    /// The textual payload returned by a tool.
    ToolResult,
    /// A description of a failed tool call.
    ToolError,
}

/// One entry of the conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    kind: TurnKind,
    content: String,
}

impl Turn {
    /// A message typed by the user.
    #[inline]
    pub fn user<S: Into<String>>(text: S) -> Self {
        Self {
            role: Role::User,
            kind: TurnKind::Message,
            content: text.into(),
        }
    }

    /// A text answer from the model.
    #[inline]
    pub fn assistant<S: Into<String>>(text: S) -> Self {
        Self {
            role: Role::Assistant,
            kind: TurnKind::Message,
            content: text.into(),
        }
    }

    /// The announcement the assistant makes before a tool runs.
    #[inline]
    pub fn tool_call(tool_name: &str) -> Self {
        Self {
            role: Role::Assistant,
            kind: TurnKind::ToolCall,
            content: format!("calling tool {tool_name}"),
        }
    }

    /// A tool's textual payload, stored verbatim.
    #[inline]
    pub fn tool_result<S: Into<String>>(text: S) -> Self {
        Self {
            role: Role::User,
            kind: TurnKind::ToolResult,
            content: text.into(),
        }
    }

    /// A failed tool call, described so that the model can react to it.
    #[inline]
    pub fn tool_error<S: Into<String>>(reason: S) -> Self {
        Self {
            role: Role::User,
            kind: TurnKind::ToolError,
            content: reason.into(),
        }
    }

    /// Returns who this turn is attributed to.
    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns what kind of content this turn holds.
    #[inline]
    pub fn kind(&self) -> TurnKind {
        self.kind
    }

    /// Returns the text of this turn.
    #[inline]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Renders this turn the way the model sees it.
    ///
    /// Tool results and failures are relayed as user messages with a short
    /// prefix, so they stay distinguishable from what the human typed.
    pub fn to_model_message(&self) -> ModelMessage {
        let text = match self.kind {
            TurnKind::Message | TurnKind::ToolCall => self.content.clone(),
            TurnKind::ToolResult => format!("Tool result : {}", self.content),
            TurnKind::ToolError => format!("Tool error : {}", self.content),
        };
        match self.role {
            Role::User => ModelMessage::User(text),
            Role::Assistant => ModelMessage::Assistant(text),
        }
    }
}

/// The turn was rejected because it has no content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("turn content must not be empty")]
pub struct EmptyTurnError;

/// An ordered, append-only sequence of turns.
///
/// This is the single source of truth for what the model sees: every
/// request carries all turns appended so far, in order. Turns can't be
/// edited or removed once appended.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// Creates an empty transcript.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a turn at the end, returning a reference to it.
    pub fn append(&mut self, turn: Turn) -> Result<&Turn, EmptyTurnError> {
        if turn.content.is_empty() {
            return Err(EmptyTurnError);
        }
        self.turns.push(turn);
        Ok(&self.turns[self.turns.len() - 1])
    }

    /// Returns all turns, oldest first.
    ///
    /// The borrow pins the view: nothing can be appended while it's alive.
    #[inline]
    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    /// Iterates over the turns, oldest first.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// Returns the most recent turn.
    #[inline]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Returns the number of turns.
    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns `true` if nothing has been said yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_keeps_order() {
        let mut transcript = Transcript::new();
        transcript.append(Turn::user("roll a die")).unwrap();
        transcript.append(Turn::tool_call("roll_die")).unwrap();
        transcript.append(Turn::tool_result("5")).unwrap();
        transcript.append(Turn::assistant("You rolled a 5.")).unwrap();

        let kinds: Vec<_> = transcript.iter().map(Turn::kind).collect();
        assert_eq!(
            kinds,
            [
                TurnKind::Message,
                TurnKind::ToolCall,
                TurnKind::ToolResult,
                TurnKind::Message
            ]
        );
        assert_eq!(transcript.snapshot()[2].content(), "5");
        assert_eq!(transcript.last().unwrap().role(), Role::Assistant);
    }

    #[test]
    fn test_reject_empty_content() {
        let mut transcript = Transcript::new();
        assert_eq!(transcript.append(Turn::user("")), Err(EmptyTurnError));
        assert!(transcript.is_empty());
    }

    #[test]
    fn test_model_rendering() {
        assert_eq!(
            Turn::tool_call("roll_die").to_model_message(),
            ModelMessage::Assistant("calling tool roll_die".to_owned())
        );
        assert_eq!(
            Turn::tool_result("5").to_model_message(),
            ModelMessage::User("Tool result : 5".to_owned())
        );
        assert_eq!(
            Turn::tool_error("connection refused").to_model_message(),
            ModelMessage::User("Tool error : connection refused".to_owned())
        );
        assert_eq!(
            Turn::user("hi").to_model_message(),
            ModelMessage::User("hi".to_owned())
        );
    }
}

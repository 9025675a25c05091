use std::borrow::Cow;
use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The tool server could not be reached, or its response could not be
    /// understood. Unknown tool names are reported this way too.
    Transport,
    /// The server ran the tool, and the tool reported a failure.
    ToolFailed,
    /// The response carried no textual payload.
    ResultMissing,
    /// The server didn't answer in time.
    Timeout,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transport => write!(f, "Tool server unavailable"),
            ErrorKind::ToolFailed => write!(f, "Tool failed"),
            ErrorKind::ResultMissing => write!(f, "Tool returned no text"),
            ErrorKind::Timeout => write!(f, "Tool call timed out"),
        }
    }
}

/// Describes a tool call error.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Error {
    kind: ErrorKind,
    reason: Option<String>,
}

impl Error {
    #[inline]
    fn new(kind: ErrorKind) -> Self {
        Self { kind, reason: None }
    }

    /// Creates a new error with the `Transport` kind.
    #[inline]
    pub fn transport() -> Self {
        Self::new(ErrorKind::Transport)
    }

    /// Creates a new error with the `ToolFailed` kind.
    #[inline]
    pub fn tool_failed() -> Self {
        Self::new(ErrorKind::ToolFailed)
    }

    /// Creates a new error with the `ResultMissing` kind.
    #[inline]
    pub fn result_missing() -> Self {
        Self::new(ErrorKind::ResultMissing)
    }

    /// Creates a new error with the `Timeout` kind.
    #[inline]
    pub fn timeout() -> Self {
        Self::new(ErrorKind::Timeout)
    }

    /// Attaches a reason to the error.
    #[inline]
    pub fn with_reason<S: Into<String>>(self, reason: S) -> Self {
        Self {
            kind: self.kind,
            reason: Some(reason.into()),
        }
    }

    /// Returns the kind of this error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the reason for the error.
    #[inline]
    pub fn reason(&self) -> Cow<'_, str> {
        match self.reason.as_deref() {
            Some(reason) => Cow::Borrowed(reason),
            None => Cow::Owned(format!("{}", self.kind)),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{}: {reason}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Error {}

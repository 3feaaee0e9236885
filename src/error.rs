//! Caller-facing errors for sending a question.
//!
//! Only failures that leave no usable answer are errors. A backend-signaled
//! error inside the stream is a normal outcome (the message shows the
//! backend's text and carries the error flag), and persistence failures are
//! swallowed where they happen.

/// Why a send produced no assistant message.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Another send is still accumulating for this session.
    #[error("a question is already streaming for session {session_id}")]
    Busy { session_id: String },

    /// The stream could not be established: connection failure or a
    /// non-success initial response. The placeholder message is discarded.
    #[error("transport error: {0}")]
    Transport(String),

    /// The chat, session or question was empty.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Transport(e.to_string())
    }
}

impl ChatError {
    /// Stable machine-readable code, used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::Busy { .. } => "busy",
            ChatError::Transport(_) => "transport",
            ChatError::InvalidRequest(_) => "bad_request",
        }
    }
}

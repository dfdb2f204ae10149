use std::time::Duration;

use thiserror::Error;

/// Low-level cause of a failed call, before phase context is attached.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("connection: {0}")]
    Connect(String),
    #[error("unexpected EOF")]
    Eof,
    #[error("transport: {0}")]
    Transport(String),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode: {0}")]
    Decode(String),
    #[error("empty chat id")]
    EmptySessionId,
    #[error("io: {0}")]
    Io(String),
}

impl Failure {
    /// Transport-class failures and the transient HTTP statuses.
    pub fn is_transient(&self) -> bool {
        match self {
            Failure::Timeout(_) | Failure::Connect(_) | Failure::Eof => true,
            Failure::Status { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Failure::Transport(_) | Failure::Decode(_) | Failure::EmptySessionId | Failure::Io(_) => {
                false
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("config: {0}")]
    Config(String),
    #[error("no messages provided")]
    NoMessages,
    #[error("failed to create chat: {0}")]
    SessionCreate(#[source] Failure),
    #[error("failed to complete chat: {0}")]
    StreamRead(#[source] Failure),
    #[error("AI response timeout: no content chunks received within {} seconds", .0.as_secs())]
    NoContentTimeout(Duration),
    #[error("AI response timeout: response incomplete after {} seconds", .0.as_secs())]
    IncompleteResponseTimeout(Duration),
    #[error("failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<ChatError>,
    },
}

impl ChatError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ChatError::SessionCreate(f) | ChatError::StreamRead(f) => f.is_transient(),
            ChatError::NoContentTimeout(_) | ChatError::IncompleteResponseTimeout(_) => true,
            ChatError::Config(_) | ChatError::NoMessages | ChatError::RetriesExhausted { .. } => {
                false
            }
        }
    }

    /// The innermost error, looking through retry exhaustion.
    pub fn root(&self) -> &ChatError {
        match self {
            ChatError::RetriesExhausted { source, .. } => source.root(),
            other => other,
        }
    }
}

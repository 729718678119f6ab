//! Error types for the chat sync core
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Send error: {0}")]
    Send(String),

    #[error("Sync engine stopped")]
    Closed,
}

impl ChatError {
    /// Whether the error came from the push transport rather than a request
    pub fn is_transport(&self) -> bool {
        matches!(self, ChatError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;

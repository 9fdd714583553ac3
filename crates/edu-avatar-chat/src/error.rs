//! Error types for the chat client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Chat backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed chat response: {0}")]
    Decode(String),
}

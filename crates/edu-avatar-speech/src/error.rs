//! Error types for the speech pipeline.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SpeechError>;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("No speech credential available")]
    CredentialUnavailable,

    #[error("Token request failed: {0}")]
    Token(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Capture device error: {0}")]
    Device(String),

    #[error("Recognition error: {0}")]
    Recognition(String),

    #[error("Credential store error: {0}")]
    Store(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

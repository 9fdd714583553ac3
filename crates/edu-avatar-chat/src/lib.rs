//! Tutoring chat: backend client, prompt construction, and conversation state.

pub mod client;
pub mod conversation;
pub mod error;
pub mod prompt;

pub use client::{ChatBackend, ChatClient, extract_reply};
pub use conversation::{Conversation, SendOutcome};
pub use error::{ChatError, Result};
pub use prompt::StudentContext;

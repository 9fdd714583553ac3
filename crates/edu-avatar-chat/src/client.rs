//! HTTP client for the tutoring backend's `/chatbot/chat` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use edu_avatar_core::types::ChatMessage;

use crate::error::{ChatError, Result};

/// Backend path accepting chat turns.
pub const CHAT_PATH: &str = "/chatbot/chat";

/// Something that turns a chat history into one assistant reply.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn talk(&self, history: &[ChatMessage], api_key: &str, model: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    chat_history: &'a [ChatMessage],
    api_key: &'a str,
    model_name: &'a str,
}

/// Pull the reply text out of a backend response.
///
/// Accepts an OpenAI-style `choices[0].message.content`, then a top-level
/// `response`, then `message`; the first non-empty string wins. Anything else
/// yields an empty reply.
pub fn extract_reply(body: &Value) -> String {
    let candidates = [
        body.pointer("/choices/0/message/content"),
        body.get("response"),
        body.get("message"),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}

pub struct ChatClient {
    url: String,
    client: reqwest::Client,
}

impl ChatClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            url: format!("{}{CHAT_PATH}", base_url.trim_end_matches('/')),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn talk(&self, history: &[ChatMessage], api_key: &str, model: &str) -> Result<String> {
        debug!(url = %self.url, model, messages = history.len(), "Sending chat request");

        let resp = self
            .client
            .post(&self.url)
            .json(&ChatRequest {
                chat_history: history,
                api_key,
                model_name: model,
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ChatError::Status { status, body });
        }

        let text = resp.text().await?;
        let body: Value =
            serde_json::from_str(&text).map_err(|e| ChatError::Decode(e.to_string()))?;
        let reply = extract_reply(&body);
        debug!(reply_len = reply.len(), "Chat reply received");
        Ok(reply)
    }
}

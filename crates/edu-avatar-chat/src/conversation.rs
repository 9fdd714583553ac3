//! Conversation state for one tutoring session.
//!
//! A [`Conversation`] can be shared behind an `Arc`: the state lock is never
//! held across a backend call, and a second `send_message` while one is in
//! flight is ignored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use edu_avatar_core::config::PromptsConfig;
use edu_avatar_core::types::{ChatMessage, ChatMode};

use crate::client::ChatBackend;
use crate::prompt::{StudentContext, assessment_prompt, bullet_points_prompt, training_prompt};

/// Assistant message appended when the backend cannot be reached.
pub const CONNECTION_ERROR_MESSAGE: &str = "⚠️ Error connecting to server.";

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const BULLET_POINT_WINDOW: usize = 4;
const MIN_BULLET_POINTS_CHARS: usize = 25;

/// Result of a [`Conversation::send_message`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank text, a request already in flight, disconnected, or no API key.
    Ignored,
    /// The backend replied; the reply was appended to the history.
    Replied(String),
    /// The backend answered with nothing usable; history holds only the user turn.
    EmptyReply,
    /// The request failed; the connection error message was appended.
    Failed(String),
}

#[derive(Debug)]
struct State {
    mode: ChatMode,
    history: Vec<ChatMessage>,
    context: StudentContext,
    bullet_points: Option<String>,
    connected: bool,
    api_key: Option<String>,
    model: String,
    draft_confirmed: bool,
}

/// Lowers a flag when dropped, including when the owning future is cancelled.
struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Conversation {
    backend: Arc<dyn ChatBackend>,
    prompts: PromptsConfig,
    state: Mutex<State>,
    thinking: AtomicBool,
    updating_draft: AtomicBool,
}

impl Conversation {
    pub fn new(backend: Arc<dyn ChatBackend>, prompts: PromptsConfig) -> Self {
        Self {
            backend,
            prompts,
            state: Mutex::new(State {
                mode: ChatMode::default(),
                history: Vec::new(),
                context: StudentContext::default(),
                bullet_points: None,
                connected: true,
                api_key: None,
                model: DEFAULT_MODEL.into(),
                draft_confirmed: false,
            }),
            thinking: AtomicBool::new(false),
            updating_draft: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mode(&self) -> ChatMode {
        self.lock().mode
    }

    pub fn set_mode(&self, mode: ChatMode) {
        self.lock().mode = mode;
    }

    pub fn set_context(&self, context: StudentContext) {
        self.lock().context = context;
    }

    pub fn context(&self) -> StudentContext {
        self.lock().context.clone()
    }

    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
    }

    pub fn set_api_key(&self, api_key: Option<String>) {
        self.lock().api_key = api_key.filter(|k| !k.is_empty());
    }

    pub fn set_model(&self, model: impl Into<String>) {
        self.lock().model = model.into();
    }

    /// Once the original draft is confirmed, every reply refreshes the bullet points.
    pub fn confirm_original_draft(&self, confirmed: bool) {
        self.lock().draft_confirmed = confirmed;
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.lock().history.clone()
    }

    pub fn clear_history(&self) {
        self.lock().history.clear();
    }

    pub fn bullet_points(&self) -> Option<String> {
        self.lock().bullet_points.clone()
    }

    pub fn is_thinking(&self) -> bool {
        self.thinking.load(Ordering::SeqCst)
    }

    pub fn is_updating_draft(&self) -> bool {
        self.updating_draft.load(Ordering::SeqCst)
    }

    fn system_prompt(&self, state: &State) -> Option<String> {
        match state.mode {
            ChatMode::Assessment => Some(assessment_prompt(&self.prompts.assessment, &state.context)),
            ChatMode::Training => Some(training_prompt(&self.prompts.training, &state.context)),
            ChatMode::Free => None,
        }
    }

    /// Send one user turn and append the reply.
    pub async fn send_message(&self, text: &str) -> SendOutcome {
        if text.trim().is_empty() {
            return SendOutcome::Ignored;
        }
        let Some(_thinking) = FlagGuard::raise(&self.thinking) else {
            debug!("Chat request already in flight, ignoring message");
            return SendOutcome::Ignored;
        };

        let (payload, api_key, model, draft_confirmed) = {
            let mut state = self.lock();
            let Some(api_key) = state.api_key.clone().filter(|_| state.connected) else {
                debug!(connected = state.connected, "Chat unavailable, ignoring message");
                return SendOutcome::Ignored;
            };
            state.history.push(ChatMessage::user(text));

            let mut payload = Vec::with_capacity(state.history.len() + 1);
            if let Some(prompt) = self.system_prompt(&state) {
                payload.push(ChatMessage::system(prompt));
            }
            payload.extend(state.history.iter().cloned());
            (payload, api_key, state.model.clone(), state.draft_confirmed)
        };

        info!(messages = payload.len(), %model, "Sending chat turn");
        match self.backend.talk(&payload, &api_key, &model).await {
            Ok(reply) if reply.is_empty() => {
                warn!("Chat backend returned an empty reply");
                SendOutcome::EmptyReply
            }
            Ok(reply) => {
                self.lock().history.push(ChatMessage::assistant(reply.clone()));
                if draft_confirmed {
                    self.extract_bullet_points().await;
                }
                SendOutcome::Replied(reply)
            }
            Err(e) => {
                error!(error = %e, "Chat request failed");
                self.lock()
                    .history
                    .push(ChatMessage::assistant(CONNECTION_ERROR_MESSAGE));
                SendOutcome::Failed(e.to_string())
            }
        }
    }

    /// Summarize the last few turns into bullet points.
    ///
    /// Returns the new bullet points when the reply was long enough to keep.
    /// Failures are only logged.
    pub async fn extract_bullet_points(&self) -> Option<String> {
        let _updating = FlagGuard::raise(&self.updating_draft)?;

        let (payload, api_key, model) = {
            let state = self.lock();
            let api_key = state.api_key.clone()?;
            let start = state.history.len().saturating_sub(BULLET_POINT_WINDOW);
            let prompt = bullet_points_prompt(&self.prompts.bullet_points, &state.history[start..]);
            (vec![ChatMessage::system(prompt)], api_key, state.model.clone())
        };

        match self.backend.talk(&payload, &api_key, &model).await {
            Ok(reply) => {
                let reply = reply.trim();
                if reply.chars().count() > MIN_BULLET_POINTS_CHARS {
                    debug!(chars = reply.len(), "Bullet points updated");
                    self.lock().bullet_points = Some(reply.to_string());
                    Some(reply.to_string())
                } else {
                    debug!("Bullet point reply too short, keeping previous");
                    None
                }
            }
            Err(e) => {
                error!(error = %e, "Error extracting bullet points");
                None
            }
        }
    }
}

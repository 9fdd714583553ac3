//! Continuous speech recognition session.
//!
//! Phases: `Idle -> Starting -> Listening -> Stopping -> Idle`, with
//! `Starting -> Idle` when the credential, capture device, or engine cannot
//! be obtained.
//!
//! The engine pushes [`RecognitionEvent`]s into a channel drained by a single
//! session task, which is the only writer of the accumulated transcript. A
//! caller stop request, an engine `SessionStopped` event, and the engine
//! dropping its sender all end that loop, so teardown runs exactly once.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use edu_avatar_core::types::AvatarState;

use crate::credential::CredentialProvider;
use crate::error::Result;
use crate::state::SpeechState;

/// Events pushed by a recognition engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// A final utterance.
    Recognized(String),
    /// The engine reported a cancellation; the session stays open.
    Canceled(String),
    /// The engine ended the session on its own (e.g. timeout).
    SessionStopped,
}

/// An open recognition session on the external engine.
#[async_trait]
pub trait RecognitionHandle: Send {
    /// Ask the engine to stop; resolves when the engine acknowledges.
    async fn stop(&mut self) -> Result<()>;
}

/// External continuous speech-to-text capability.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    async fn open(
        &self,
        auth_token: &str,
        region: &str,
        language: &str,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> Result<Box<dyn RecognitionHandle>>;
}

/// Exclusive hold on the capture hardware.
pub trait CaptureHandle: Send {
    fn release(&mut self);
}

/// Microphone (or stand-in) access; acquiring may prompt for permission.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn CaptureHandle>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

/// User-visible notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, level: NotificationLevel);
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str, level: NotificationLevel) {
        match level {
            NotificationLevel::Info => info!(notification = message),
            NotificationLevel::Error => error!(notification = message),
        }
    }
}

/// Receives the final transcript of a session, at most once.
pub type TranscriptSink = Box<dyn FnOnce(String) + Send + 'static>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecognitionPhase {
    #[default]
    Idle,
    Starting,
    Listening,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Requested,
    SessionStopped,
    EngineClosed,
}

struct ActiveSession {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

/// State owned by one running session; dropped on teardown.
struct SessionState {
    accumulated: String,
    recognition: Box<dyn RecognitionHandle>,
    capture: Box<dyn CaptureHandle>,
}

impl SessionState {
    fn append(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.accumulated.push_str(text);
        self.accumulated.push(' ');
    }
}

/// Drives one recognition session at a time.
pub struct Recognizer {
    engine: Arc<dyn RecognitionEngine>,
    capture: Arc<dyn CaptureDevice>,
    credentials: Arc<dyn CredentialProvider>,
    notifier: Arc<dyn Notifier>,
    state: SpeechState,
    language: String,
    phase: Arc<watch::Sender<RecognitionPhase>>,
    active: Mutex<Option<ActiveSession>>,
}

impl Recognizer {
    pub fn new(
        engine: Arc<dyn RecognitionEngine>,
        capture: Arc<dyn CaptureDevice>,
        credentials: Arc<dyn CredentialProvider>,
        state: SpeechState,
        language: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            capture,
            credentials,
            notifier: Arc::new(LogNotifier),
            state,
            language: language.into(),
            phase: Arc::new(watch::channel(RecognitionPhase::Idle).0),
            active: Mutex::new(None),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn phase(&self) -> RecognitionPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<RecognitionPhase> {
        self.phase.subscribe()
    }

    pub fn state(&self) -> &SpeechState {
        &self.state
    }

    /// Start a session delivering its transcript to `sink`.
    ///
    /// Returns `false` when a session is already active or the start failed;
    /// failures are reported through the notifier.
    pub async fn start(&self, sink: TranscriptSink) -> bool {
        let claimed = self.phase.send_if_modified(|phase| {
            if *phase == RecognitionPhase::Idle {
                *phase = RecognitionPhase::Starting;
                true
            } else {
                false
            }
        });
        if !claimed {
            debug!(phase = ?self.phase(), "Recognition already active, ignoring start");
            return false;
        }
        let mut claim = StartClaim {
            phase: &self.phase,
            held: true,
        };

        let credential = self.credentials.get_credential().await;
        let Some((token, region)) = credential.as_pair() else {
            self.notifier
                .notify("Could not get speech token", NotificationLevel::Error);
            return false;
        };

        let (capture, recognition, events) = match self.open_session(token, region).await {
            Ok(opened) => opened,
            Err(e) => {
                error!(error = %e, "Speech recognition failed to start");
                self.notifier
                    .notify("Speech recognition failed", NotificationLevel::Error);
                return false;
            }
        };

        let session = SessionState {
            accumulated: String::new(),
            recognition,
            capture,
        };

        let mut active = self.active.lock().await;
        self.state.set_recording(true);
        self.state.set_avatar_state(AvatarState::Listening);
        self.phase.send_replace(RecognitionPhase::Listening);
        claim.held = false;

        let stop = CancellationToken::new();
        let task = tokio::spawn(run_session(
            session,
            events,
            stop.clone(),
            sink,
            self.state.clone(),
            self.phase.clone(),
        ));
        *active = Some(ActiveSession { stop, task });

        info!(language = %self.language, region, "Recognition session started");
        true
    }

    async fn open_session(
        &self,
        token: &str,
        region: &str,
    ) -> Result<(
        Box<dyn CaptureHandle>,
        Box<dyn RecognitionHandle>,
        mpsc::UnboundedReceiver<RecognitionEvent>,
    )> {
        let mut capture = self.capture.acquire().await?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        match self
            .engine
            .open(token, region, &self.language, event_tx)
            .await
        {
            Ok(recognition) => Ok((capture, recognition, event_rx)),
            Err(e) => {
                capture.release();
                Err(e)
            }
        }
    }

    /// Stop the running session and wait for its teardown.
    ///
    /// Returns `false` (and does nothing) when no session is listening.
    pub async fn stop(&self) -> bool {
        if self.phase() != RecognitionPhase::Listening {
            debug!(phase = ?self.phase(), "No listening session, ignoring stop");
            return false;
        }

        let Some(active) = self.active.lock().await.take() else {
            return false;
        };
        active.stop.cancel();
        if let Err(e) = active.task.await {
            error!(error = %e, "Recognition session task failed");
        }
        true
    }
}

/// The `Starting` phase claimed by [`Recognizer::start`]. Unless the start
/// completes, dropping it returns the phase to `Idle`, including when the
/// `start` future itself is dropped.
struct StartClaim<'a> {
    phase: &'a watch::Sender<RecognitionPhase>,
    held: bool,
}

impl Drop for StartClaim<'_> {
    fn drop(&mut self) {
        if self.held {
            self.phase.send_replace(RecognitionPhase::Idle);
        }
    }
}

async fn run_session(
    mut session: SessionState,
    mut events: mpsc::UnboundedReceiver<RecognitionEvent>,
    stop: CancellationToken,
    sink: TranscriptSink,
    state: SpeechState,
    phase: Arc<watch::Sender<RecognitionPhase>>,
) {
    let reason = loop {
        tokio::select! {
            _ = stop.cancelled() => break StopReason::Requested,
            event = events.recv() => match event {
                Some(RecognitionEvent::Recognized(text)) => {
                    debug!(chars = text.len(), "Utterance recognized");
                    session.append(&text);
                }
                Some(RecognitionEvent::Canceled(reason)) => {
                    warn!(reason, "Recognition canceled");
                }
                Some(RecognitionEvent::SessionStopped) => break StopReason::SessionStopped,
                None => break StopReason::EngineClosed,
            },
        }
    };

    phase.send_replace(RecognitionPhase::Stopping);
    debug!(?reason, "Stopping recognition session");

    if reason == StopReason::Requested {
        if let Err(e) = session.recognition.stop().await {
            warn!(error = %e, "Recognition engine did not stop cleanly");
        }
        // Utterances finalized while the engine was stopping still count
        while let Ok(event) = events.try_recv() {
            if let RecognitionEvent::Recognized(text) = event {
                session.append(&text);
            }
        }
    }

    let transcript = session.accumulated.trim().to_string();
    if !transcript.is_empty() {
        info!(chars = transcript.len(), "Delivering transcript");
        sink(transcript);
    }

    session.capture.release();
    state.set_recording(false);
    state.settle_avatar();
    phase.send_replace(RecognitionPhase::Idle);
    info!("Recognition session ended");
}

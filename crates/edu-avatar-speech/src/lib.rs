//! Speech pipeline: credential caching, sentence-ordered synthesis playback,
//! and continuous recognition sessions.

pub mod audio_file;
pub mod credential;
pub mod error;
pub mod recognition;
pub mod sentence;
pub mod ssml;
pub mod state;
pub mod store;
pub mod stt;
pub mod synthesis;
pub mod tts;

pub use credential::{CredentialCache, CredentialProvider, HttpTokenIssuer, IssuedToken, TokenIssuer};
pub use error::{Result, SpeechError};
pub use recognition::{
    CaptureDevice, CaptureHandle, LogNotifier, NotificationLevel, Notifier, RecognitionEngine,
    RecognitionEvent, RecognitionHandle, RecognitionPhase, Recognizer, TranscriptSink,
};
pub use sentence::split_into_sentences;
pub use state::SpeechState;
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use synthesis::{AudioBuffer, AudioSink, SpeakReport, Speaker, SpeechSynthesizer, SynthesisRequest};

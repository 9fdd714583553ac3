//! Sentence-by-sentence synthesis with strictly ordered playback.
//!
//! Every sentence is synthesized in its own task as soon as the reply is
//! split, while a single playback loop awaits those tasks in sentence order.
//! Synthesis of later sentences overlaps playback of earlier ones, but the
//! spoken order always matches the text.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info};

use edu_avatar_core::config::SpeechConfig;
use edu_avatar_core::types::AvatarState;

use crate::credential::CredentialProvider;
use crate::error::{Result, SpeechError};
use crate::sentence::split_into_sentences;
use crate::ssml::build_ssml;
use crate::state::SpeechState;

/// One synthesis call against the speech service.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub auth_token: String,
    pub region: String,
    pub voice: String,
    pub ssml: String,
}

/// Synthesized audio for exactly one sentence.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Position of the sentence in the reply.
    pub index: usize,
    pub sentence: String,
    pub data: Bytes,
}

/// External text-to-speech capability.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<Bytes>;
}

/// Audio output. `play` resolves once the buffer has finished playing.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, buffer: AudioBuffer) -> Result<()>;
}

/// Outcome of one [`Speaker::speak_reply`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpeakReport {
    pub sentences: usize,
    pub played: usize,
    pub failed: usize,
}

/// Reads replies aloud through a synthesizer and an audio sink.
pub struct Speaker {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn AudioSink>,
    credentials: Arc<dyn CredentialProvider>,
    state: SpeechState,
    config: Arc<SpeechConfig>,
}

impl Speaker {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: Arc<dyn AudioSink>,
        credentials: Arc<dyn CredentialProvider>,
        state: SpeechState,
        config: SpeechConfig,
    ) -> Self {
        Self {
            synthesizer,
            sink,
            credentials,
            state,
            config: Arc::new(config),
        }
    }

    pub fn state(&self) -> &SpeechState {
        &self.state
    }

    /// Synthesize and play `text` sentence by sentence.
    ///
    /// Failures are logged per sentence and never abort the remaining ones.
    pub async fn speak_reply(&self, text: &str) -> SpeakReport {
        let sentences = split_into_sentences(text);
        if sentences.is_empty() {
            debug!("Nothing to speak");
            return SpeakReport::default();
        }

        let started = Instant::now();
        let mut report = SpeakReport {
            sentences: sentences.len(),
            ..SpeakReport::default()
        };
        self.state.set_playing(true);
        let mut guard = PlaybackGuard {
            state: &self.state,
            synthesis: Vec::new(),
        };

        let voice = self
            .config
            .voices
            .voice_for(self.state.avatar_gender())
            .to_string();

        let pending: Vec<JoinHandle<Result<AudioBuffer>>> = sentences
            .into_iter()
            .enumerate()
            .map(|(index, sentence)| {
                let job = SynthesisJob {
                    index,
                    sentence,
                    voice: voice.clone(),
                    synthesizer: self.synthesizer.clone(),
                    credentials: self.credentials.clone(),
                    config: self.config.clone(),
                };
                tokio::spawn(job.run())
            })
            .collect();
        guard.synthesis = pending.iter().map(JoinHandle::abort_handle).collect();

        for (index, handle) in pending.into_iter().enumerate() {
            let buffer = match handle.await {
                Ok(Ok(buffer)) => buffer,
                Ok(Err(e)) => {
                    error!(index, error = %e, "Sentence synthesis failed");
                    report.failed += 1;
                    continue;
                }
                Err(e) => {
                    error!(index, error = %e, "Synthesis task did not complete");
                    report.failed += 1;
                    continue;
                }
            };

            self.state.set_avatar_state(AvatarState::Speaking);
            let bytes = buffer.data.len();
            match self.sink.play(buffer).await {
                Ok(()) => {
                    debug!(index, bytes, "Sentence played");
                    report.played += 1;
                }
                Err(e) => {
                    error!(index, error = %e, "Sentence playback failed");
                    report.failed += 1;
                }
            }
        }

        drop(guard);
        info!(
            sentences = report.sentences,
            played = report.played,
            failed = report.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Reply playback finished"
        );
        report
    }
}

/// Lowers `playing` and settles the avatar once the reply is done, or when
/// the `speak_reply` future is dropped mid-way. Outstanding synthesis tasks
/// are aborted with it.
struct PlaybackGuard<'a> {
    state: &'a SpeechState,
    synthesis: Vec<AbortHandle>,
}

impl Drop for PlaybackGuard<'_> {
    fn drop(&mut self) {
        for task in &self.synthesis {
            task.abort();
        }
        self.state.set_playing(false);
        self.state.settle_avatar();
    }
}

struct SynthesisJob {
    index: usize,
    sentence: String,
    voice: String,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    credentials: Arc<dyn CredentialProvider>,
    config: Arc<SpeechConfig>,
}

impl SynthesisJob {
    async fn run(self) -> Result<AudioBuffer> {
        let credential = self.credentials.get_credential().await;
        let (token, region) = credential
            .as_pair()
            .ok_or(SpeechError::CredentialUnavailable)?;

        let ssml = build_ssml(
            &self.config.language,
            &self.voice,
            &self.config.prosody,
            &self.sentence,
        );
        let request = SynthesisRequest {
            auth_token: token.to_string(),
            region: region.to_string(),
            voice: self.voice.clone(),
            ssml,
        };

        debug!(index = self.index, voice = %self.voice, "Synthesizing sentence");
        let data = self.synthesizer.synthesize(request).await?;
        Ok(AudioBuffer {
            index: self.index,
            sentence: self.sentence,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use edu_avatar_core::types::{AvatarGender, Credential};

    use super::*;

    struct FixedCredentials(Credential);

    #[async_trait]
    impl CredentialProvider for FixedCredentials {
        async fn get_credential(&self) -> Credential {
            self.0.clone()
        }
    }

    /// Delays and failures are keyed on text found in the SSML.
    #[derive(Default)]
    struct ScriptedSynthesizer {
        requests: Mutex<Vec<SynthesisRequest>>,
        completed: Mutex<Vec<String>>,
        fail_containing: Option<String>,
        delays_ms: Vec<(String, u64)>,
    }

    #[async_trait]
    impl SpeechSynthesizer for ScriptedSynthesizer {
        async fn synthesize(&self, request: SynthesisRequest) -> Result<Bytes> {
            self.requests.lock().unwrap().push(request.clone());
            let delay = self
                .delays_ms
                .iter()
                .find(|(needle, _)| request.ssml.contains(needle.as_str()))
                .map(|(_, ms)| *ms)
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;

            if let Some(needle) = &self.fail_containing {
                if request.ssml.contains(needle.as_str()) {
                    return Err(SpeechError::Synthesis("service rejected sentence".into()));
                }
            }
            self.completed.lock().unwrap().push(request.ssml.clone());
            Ok(Bytes::from(request.ssml.into_bytes()))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        played: Mutex<Vec<(usize, String)>>,
        fail_index: Option<usize>,
    }

    #[async_trait]
    impl AudioSink for RecordingSink {
        async fn play(&self, buffer: AudioBuffer) -> Result<()> {
            if self.fail_index == Some(buffer.index) {
                return Err(SpeechError::Playback("device busy".into()));
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.played
                .lock()
                .unwrap()
                .push((buffer.index, buffer.sentence));
            Ok(())
        }
    }

    fn speaker(
        synthesizer: Arc<ScriptedSynthesizer>,
        sink: Arc<RecordingSink>,
        credential: Credential,
        state: SpeechState,
    ) -> Speaker {
        Speaker::new(
            synthesizer,
            sink,
            Arc::new(FixedCredentials(credential)),
            state,
            SpeechConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_two_sentence_reply() {
        let synth = Arc::new(ScriptedSynthesizer::default());
        let sink = Arc::new(RecordingSink::default());
        let state = SpeechState::default();
        let speaker = speaker(
            synth.clone(),
            sink.clone(),
            Credential::new("tok", "eastus"),
            state.clone(),
        );

        let report = speaker.speak_reply("Hello there. How are you?").await;

        assert_eq!(
            report,
            SpeakReport {
                sentences: 2,
                played: 2,
                failed: 0
            }
        );
        assert_eq!(synth.requests.lock().unwrap().len(), 2);
        assert_eq!(
            *sink.played.lock().unwrap(),
            vec![
                (0, "Hello there.".to_string()),
                (1, "How are you?".to_string())
            ]
        );
        assert!(!state.playing());
        assert_eq!(state.avatar_state(), AvatarState::Idle);
    }

    #[tokio::test]
    async fn test_playback_order_survives_reversed_completion() {
        let synth = Arc::new(ScriptedSynthesizer {
            delays_ms: vec![
                ("First".into(), 120),
                ("Second".into(), 60),
                ("Third".into(), 0),
            ],
            ..ScriptedSynthesizer::default()
        });
        let sink = Arc::new(RecordingSink::default());
        let speaker = speaker(
            synth.clone(),
            sink.clone(),
            Credential::new("tok", "eastus"),
            SpeechState::default(),
        );

        speaker
            .speak_reply("First sentence. Second sentence. Third sentence.")
            .await;

        let completed = synth.completed.lock().unwrap().clone();
        assert!(completed[0].contains("Third"), "synthesis should finish in reverse");
        assert!(completed[2].contains("First"));

        let played: Vec<usize> = sink.played.lock().unwrap().iter().map(|(i, _)| *i).collect();
        assert_eq!(played, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_failed_sentence_is_skipped() {
        let synth = Arc::new(ScriptedSynthesizer {
            fail_containing: Some("broken".into()),
            ..ScriptedSynthesizer::default()
        });
        let sink = Arc::new(RecordingSink {
            fail_index: Some(2),
            ..RecordingSink::default()
        });
        let state = SpeechState::default();
        let speaker = speaker(
            synth,
            sink.clone(),
            Credential::new("tok", "eastus"),
            state.clone(),
        );

        let report = speaker
            .speak_reply("Fine start. A broken middle. Playback dies here. Happy end.")
            .await;

        assert_eq!(report.sentences, 4);
        assert_eq!(report.played, 2);
        assert_eq!(report.failed, 2);
        let played: Vec<usize> = sink.played.lock().unwrap().iter().map(|(i, _)| *i).collect();
        assert_eq!(played, vec![0, 3]);
        assert!(!state.playing());
    }

    #[tokio::test]
    async fn test_missing_credential_fails_every_sentence() {
        let synth = Arc::new(ScriptedSynthesizer::default());
        let sink = Arc::new(RecordingSink::default());
        let state = SpeechState::default();
        let speaker = speaker(
            synth.clone(),
            sink.clone(),
            Credential::unavailable(),
            state.clone(),
        );

        let report = speaker.speak_reply("One. Two.").await;

        assert_eq!(report.failed, 2);
        assert!(synth.requests.lock().unwrap().is_empty());
        assert!(sink.played.lock().unwrap().is_empty());
        assert!(!state.playing());
        assert_eq!(state.avatar_state(), AvatarState::Idle);
    }

    #[tokio::test]
    async fn test_voice_follows_gender() {
        let synth = Arc::new(ScriptedSynthesizer::default());
        let state = SpeechState::new(AvatarGender::Female);
        let speaker = speaker(
            synth.clone(),
            Arc::new(RecordingSink::default()),
            Credential::new("tok", "eastus"),
            state.clone(),
        );

        speaker.speak_reply("Hi.").await;
        state.set_avatar_gender(AvatarGender::Male);
        speaker.speak_reply("Bye.").await;

        let requests = synth.requests.lock().unwrap();
        assert_eq!(requests[0].voice, "en-US-JennyNeural");
        assert_eq!(requests[0].auth_token, "tok");
        assert_eq!(requests[0].region, "eastus");
        assert_eq!(requests[1].voice, "en-US-GuyNeural");
        assert!(requests[1].ssml.contains(r#"rate="-8%" pitch="-10%""#));
    }

    #[tokio::test]
    async fn test_blank_reply_is_noop() {
        let synth = Arc::new(ScriptedSynthesizer::default());
        let state = SpeechState::default();
        let speaker = speaker(
            synth.clone(),
            Arc::new(RecordingSink::default()),
            Credential::new("tok", "eastus"),
            state.clone(),
        );

        let report = speaker.speak_reply("   ").await;
        assert_eq!(report, SpeakReport::default());
        assert!(synth.requests.lock().unwrap().is_empty());
        assert!(!state.playing());
    }

    #[tokio::test]
    async fn test_dropped_reply_resets_flags_and_aborts_synthesis() {
        let synth = Arc::new(ScriptedSynthesizer {
            delays_ms: vec![("One.".into(), 200), ("Two.".into(), 200)],
            ..ScriptedSynthesizer::default()
        });
        let state = SpeechState::default();
        let speaker = speaker(
            synth.clone(),
            Arc::new(RecordingSink::default()),
            Credential::new("tok", "eastus"),
            state.clone(),
        );

        let interrupted =
            tokio::time::timeout(Duration::from_millis(20), speaker.speak_reply("One. Two.")).await;
        assert!(interrupted.is_err());
        assert!(!state.playing());
        assert_eq!(state.avatar_state(), AvatarState::Idle);

        // The aborted tasks never finish their synthesis calls
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(synth.requests.lock().unwrap().len(), 2);
        assert!(synth.completed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_playing_flag_raised_during_playback() {
        struct ObservingSink {
            state: SpeechState,
            seen: Mutex<Vec<(bool, AvatarState)>>,
        }

        #[async_trait]
        impl AudioSink for ObservingSink {
            async fn play(&self, _buffer: AudioBuffer) -> Result<()> {
                self.seen
                    .lock()
                    .unwrap()
                    .push((self.state.playing(), self.state.avatar_state()));
                Ok(())
            }
        }

        let state = SpeechState::default();
        let sink = Arc::new(ObservingSink {
            state: state.clone(),
            seen: Mutex::new(Vec::new()),
        });
        let speaker = Speaker::new(
            Arc::new(ScriptedSynthesizer::default()),
            sink.clone(),
            Arc::new(FixedCredentials(Credential::new("tok", "eastus"))),
            state.clone(),
            SpeechConfig::default(),
        );

        speaker.speak_reply("Only one.").await;
        assert_eq!(
            *sink.seen.lock().unwrap(),
            vec![(true, AvatarState::Speaking)]
        );
        assert!(!state.playing());
    }
}

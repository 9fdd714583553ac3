//! Recognition over the Azure short-audio REST endpoint.
//!
//! Each chunk pulled from an [`AudioSource`] is wrapped in a WAV container and
//! posted as one request; final results are pushed as
//! [`RecognitionEvent`]s. When the source runs dry the engine ends the
//! session itself with `SessionStopped`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use edu_avatar_core::config::SpeechConfig;

use crate::error::Result;
use crate::recognition::{RecognitionEngine, RecognitionEvent, RecognitionHandle};

/// Sample rate every [`AudioSource`] delivers.
pub const SAMPLE_RATE: u32 = 16_000;

const DEFAULT_ENDPOINT: &str =
    "https://{region}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1";

/// Wrap raw 16-bit PCM in a WAV container.
pub fn pcm_to_wav(pcm: &[i16], sample_rate: u32, channels: u16, bits_per_sample: u16) -> Vec<u8> {
    let data_len = pcm.len() * 2;
    let byte_rate = sample_rate * channels as u32 * bits_per_sample as u32 / 8;
    let block_align = channels * bits_per_sample / 8;
    let file_size = 36 + data_len as u32;

    let mut wav = Vec::with_capacity(44 + data_len);

    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&file_size.to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&bits_per_sample.to_le_bytes());

    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(data_len as u32).to_le_bytes());
    for &sample in pcm {
        wav.extend_from_slice(&sample.to_le_bytes());
    }

    wav
}

/// Captured audio, delivered as 16 kHz mono chunks.
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// The next chunk, or `None` once capture has ended.
    async fn next_chunk(&self) -> Result<Option<Vec<i16>>>;
}

/// Build the recognition URL for `region` from an optional `{region}` template.
pub fn build_stt_url(template: Option<&str>, region: &str) -> String {
    template
        .unwrap_or(DEFAULT_ENDPOINT)
        .replace("{region}", region)
}

/// `format=simple` response body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SimpleRecognition {
    pub recognition_status: String,
    #[serde(default)]
    pub display_text: String,
}

impl SimpleRecognition {
    /// Map a result onto a session event; silence and no-match yield nothing.
    pub fn into_event(self) -> Option<RecognitionEvent> {
        match self.recognition_status.as_str() {
            "Success" if !self.display_text.trim().is_empty() => {
                Some(RecognitionEvent::Recognized(self.display_text))
            }
            "Success" | "NoMatch" | "InitialSilenceTimeout" | "BabbleTimeout" => None,
            other => Some(RecognitionEvent::Canceled(format!(
                "recognition status {other}"
            ))),
        }
    }
}

/// REST-backed [`RecognitionEngine`] reading from an [`AudioSource`].
pub struct AzureRestRecognizer {
    client: reqwest::Client,
    endpoint: Option<String>,
    source: Arc<dyn AudioSource>,
}

impl AzureRestRecognizer {
    pub fn new(config: &SpeechConfig, source: Arc<dyn AudioSource>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.stt_endpoint.clone(),
            source,
        })
    }

    pub fn endpoint(&self, region: &str) -> String {
        build_stt_url(self.endpoint.as_deref(), region)
    }
}

#[async_trait]
impl RecognitionEngine for AzureRestRecognizer {
    async fn open(
        &self,
        auth_token: &str,
        region: &str,
        language: &str,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> Result<Box<dyn RecognitionHandle>> {
        let worker = RestWorker {
            client: self.client.clone(),
            url: self.endpoint(region),
            auth_token: auth_token.to_string(),
            language: language.to_string(),
            source: self.source.clone(),
            events,
        };
        let cancel = CancellationToken::new();
        let task = tokio::spawn(worker.run(cancel.clone()));

        Ok(Box::new(RestRecognitionHandle {
            cancel,
            task: Some(task),
        }))
    }
}

struct RestRecognitionHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl RecognitionHandle for RestRecognitionHandle {
    async fn stop(&mut self) -> Result<()> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Recognition worker panicked");
            }
        }
        Ok(())
    }
}

impl Drop for RestRecognitionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct RestWorker {
    client: reqwest::Client,
    url: String,
    auth_token: String,
    language: String,
    source: Arc<dyn AudioSource>,
    events: mpsc::UnboundedSender<RecognitionEvent>,
}

impl RestWorker {
    async fn run(self, cancel: CancellationToken) {
        info!(url = %self.url, language = %self.language, "Recognition worker started");
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => break,
                chunk = self.source.next_chunk() => chunk,
            };

            match chunk {
                // A chunk already captured is transcribed even if a stop arrives meanwhile
                Ok(Some(pcm)) => {
                    if let Some(event) = self.transcribe(&pcm).await {
                        if self.events.send(event).is_err() {
                            debug!("Recognition event receiver dropped");
                            break;
                        }
                    }
                }
                Ok(None) => {
                    debug!("Audio source exhausted");
                    let _ = self.events.send(RecognitionEvent::SessionStopped);
                    break;
                }
                Err(e) => {
                    let _ = self
                        .events
                        .send(RecognitionEvent::Canceled(format!("audio source failed: {e}")));
                    let _ = self.events.send(RecognitionEvent::SessionStopped);
                    break;
                }
            }
        }
        info!("Recognition worker ended");
    }

    async fn transcribe(&self, pcm: &[i16]) -> Option<RecognitionEvent> {
        if pcm.is_empty() {
            return None;
        }
        let wav = pcm_to_wav(pcm, SAMPLE_RATE, 1, 16);
        debug!(wav_bytes = wav.len(), "Sending audio chunk for recognition");

        let resp = self
            .client
            .post(&self.url)
            .query(&[("language", self.language.as_str()), ("format", "simple")])
            .bearer_auth(&self.auth_token)
            .header(
                "Content-Type",
                format!("audio/wav; codecs=audio/pcm; samplerate={SAMPLE_RATE}"),
            )
            .header("Accept", "application/json")
            .body(wav)
            .send()
            .await;

        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => return Some(RecognitionEvent::Canceled(format!("request failed: {e}"))),
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Some(RecognitionEvent::Canceled(format!(
                "STT API error {status}: {body}"
            )));
        }

        match resp.json::<SimpleRecognition>().await {
            Ok(result) => result.into_event(),
            Err(e) => Some(RecognitionEvent::Canceled(format!(
                "unreadable recognition result: {e}"
            ))),
        }
    }
}

//! Azure neural TTS over the REST endpoint.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use edu_avatar_core::config::SpeechConfig;

use crate::error::{Result, SpeechError};
use crate::synthesis::{SpeechSynthesizer, SynthesisRequest};

const DEFAULT_ENDPOINT: &str = "https://{region}.tts.speech.microsoft.com/cognitiveservices/v1";
const USER_AGENT: &str = "edu-avatar";

/// Build the synthesis URL for `region` from an optional `{region}` template.
pub fn build_tts_url(template: Option<&str>, region: &str) -> String {
    template
        .unwrap_or(DEFAULT_ENDPOINT)
        .replace("{region}", region)
}

/// Synthesizes SSML into a RIFF PCM clip with a bearer token.
pub struct AzureSynthesizer {
    client: reqwest::Client,
    endpoint: Option<String>,
    output_format: String,
}

impl AzureSynthesizer {
    pub fn new(config: &SpeechConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.tts_endpoint.clone(),
            output_format: config.output_format.clone(),
        })
    }

    pub fn endpoint(&self, region: &str) -> String {
        build_tts_url(self.endpoint.as_deref(), region)
    }
}

#[async_trait]
impl SpeechSynthesizer for AzureSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<Bytes> {
        let url = self.endpoint(&request.region);
        debug!(url, voice = %request.voice, ssml_len = request.ssml.len(), "Synthesizing sentence");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&request.auth_token)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", &self.output_format)
            .header("User-Agent", USER_AGENT)
            .body(request.ssml)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SpeechError::Synthesis(format!("TTS API error {status}: {body}")));
        }

        let audio = resp.bytes().await?;
        if audio.is_empty() {
            return Err(SpeechError::Synthesis("TTS API returned no audio".into()));
        }
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_url_uses_region() {
        assert_eq!(
            build_tts_url(None, "westeurope"),
            "https://westeurope.tts.speech.microsoft.com/cognitiveservices/v1"
        );
    }

    #[test]
    fn test_override_template() {
        let synth = AzureSynthesizer::new(&SpeechConfig {
            tts_endpoint: Some("http://127.0.0.1:9000/{region}/tts".into()),
            ..SpeechConfig::default()
        })
        .unwrap();
        assert_eq!(synth.endpoint("eastus"), "http://127.0.0.1:9000/eastus/tts");
    }
}

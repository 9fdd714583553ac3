//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::AvatarGender;

/// Top-level Edu Avatar configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech: Option<SpeechConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat: Option<ChatConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Backend serving the speech token and chat endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    "http://localhost:8000".into()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

/// Speech synthesis and recognition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Recognition and SSML language (default: "en-US").
    #[serde(default = "default_language")]
    pub language: String,

    /// Lifetime of a cached speech token in minutes (default: 9).
    #[serde(default = "default_token_ttl_minutes")]
    pub token_ttl_minutes: u32,

    /// HTTP request timeout in seconds (default: 30).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub voices: VoicesConfig,

    #[serde(default)]
    pub prosody: ProsodyConfig,

    /// Synthesis output format header value.
    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// Where cached credentials are persisted (default: `~/.edu_avatar/credentials.json`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_store: Option<String>,

    /// Override for the synthesis endpoint. `{region}` is substituted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts_endpoint: Option<String>,

    /// Override for the recognition endpoint. `{region}` is substituted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stt_endpoint: Option<String>,
}

fn default_language() -> String {
    "en-US".into()
}

fn default_token_ttl_minutes() -> u32 {
    9
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_output_format() -> String {
    "riff-24khz-16bit-mono-pcm".into()
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            token_ttl_minutes: default_token_ttl_minutes(),
            request_timeout_secs: default_request_timeout_secs(),
            voices: VoicesConfig::default(),
            prosody: ProsodyConfig::default(),
            output_format: default_output_format(),
            credential_store: None,
            tts_endpoint: None,
            stt_endpoint: None,
        }
    }
}

/// Voice names per avatar gender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoicesConfig {
    #[serde(default = "default_female_voice")]
    pub female: String,
    #[serde(default = "default_male_voice")]
    pub male: String,
}

fn default_female_voice() -> String {
    "en-US-JennyNeural".into()
}

fn default_male_voice() -> String {
    "en-US-GuyNeural".into()
}

impl Default for VoicesConfig {
    fn default() -> Self {
        Self {
            female: default_female_voice(),
            male: default_male_voice(),
        }
    }
}

impl VoicesConfig {
    pub fn voice_for(&self, gender: AvatarGender) -> &str {
        match gender {
            AvatarGender::Female => &self.female,
            AvatarGender::Male => &self.male,
        }
    }
}

/// Fixed prosody attenuation applied to every synthesized sentence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProsodyConfig {
    #[serde(default = "default_rate")]
    pub rate: String,
    #[serde(default = "default_pitch")]
    pub pitch: String,
}

fn default_rate() -> String {
    "-8%".into()
}

fn default_pitch() -> String {
    "-10%".into()
}

impl Default for ProsodyConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            pitch: default_pitch(),
        }
    }
}

/// Chat backend credentials and model selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Chat request timeout in seconds (default: 120).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ChatConfig {
    /// Resolve the API key: check `api_key` field first, then `api_key_env` environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

/// System prompt text per tutoring mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default)]
    pub assessment: String,
    #[serde(default)]
    pub training: String,
    #[serde(default)]
    pub bullet_points: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "edu_avatar_speech=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: None,
            filters: Vec::new(),
            output: default_log_output(),
        }
    }
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex");
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::EduAvatarError::Io)?;

        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::EduAvatarError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file path.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn base_url(&self) -> String {
        self.backend
            .as_ref()
            .map(|b| b.base_url.trim_end_matches('/').to_string())
            .unwrap_or_else(default_base_url)
    }

    /// Speech settings, falling back to defaults.
    pub fn speech(&self) -> SpeechConfig {
        self.speech.clone().unwrap_or_default()
    }

    pub fn prompts(&self) -> PromptsConfig {
        self.prompts.clone().unwrap_or_default()
    }

    /// Resolve the credential store path, expanding `~`.
    pub fn credential_store_path(&self) -> PathBuf {
        self.speech
            .as_ref()
            .and_then(|s| s.credential_store.as_ref())
            .map(|p| {
                let expanded = shellexpand::tilde(p);
                PathBuf::from(expanded.as_ref())
            })
            .unwrap_or_else(|| data_dir().join("credentials.json"))
    }

    pub fn chat_api_key(&self) -> Option<String> {
        self.chat.as_ref().and_then(|c| c.resolve_api_key())
    }

    /// Chat model name (default: "gpt-4o-mini").
    pub fn chat_model(&self) -> String {
        self.chat
            .as_ref()
            .and_then(|c| c.model.clone())
            .unwrap_or_else(|| "gpt-4o-mini".to_string())
    }

    pub fn chat_timeout_secs(&self) -> u64 {
        self.chat.as_ref().and_then(|c| c.timeout_secs).unwrap_or(120)
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Get a config value by dotted path (e.g. "speech.language").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if self.chat_api_key().is_none() {
            warnings.push("Chat has no API key configured".to_string());
        }

        if let Some(backend) = &self.backend {
            if backend.base_url.trim().is_empty() {
                errors.push("Backend base_url cannot be empty".to_string());
            }
        }

        if let Some(speech) = &self.speech {
            if speech.token_ttl_minutes == 0 {
                errors.push("Speech token_ttl_minutes cannot be 0".to_string());
            }
            if speech.voices.female.is_empty() || speech.voices.male.is_empty() {
                errors.push("Speech voices cannot be empty".to_string());
            }
        }

        let prompts = self.prompts();
        if prompts.assessment.is_empty() || prompts.training.is_empty() {
            warnings.push("Tutoring prompts are not configured".to_string());
        }

        (warnings, errors)
    }
}

/// Base directory for Edu Avatar data: `~/.edu_avatar/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".edu_avatar")
}

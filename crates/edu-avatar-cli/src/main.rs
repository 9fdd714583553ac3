mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use edu_avatar_chat::{ChatClient, Conversation, SendOutcome};
use edu_avatar_core::config::Config;
use edu_avatar_core::types::{AvatarGender, ChatMode};
use edu_avatar_speech::audio_file::{FileSink, PcmFileSource};
use edu_avatar_speech::stt::AzureRestRecognizer;
use edu_avatar_speech::tts::AzureSynthesizer;
use edu_avatar_speech::{
    CredentialCache, CredentialProvider, FileStore, HttpTokenIssuer, RecognitionPhase,
    Recognizer, Speaker, SpeechState,
};

#[derive(Parser)]
#[command(
    name = "edu-avatar",
    about = "Speech and chat pipeline for the Edu Avatar writing tutor",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch (or reuse) a speech token and show its region
    Token,

    /// Speak text sentence by sentence, writing one WAV per sentence
    Speak {
        /// Text to speak
        #[arg(short, long)]
        text: String,

        /// Avatar voice: male or female
        #[arg(long, default_value = "male")]
        gender: AvatarGender,

        /// Output directory for the audio clips
        #[arg(long, default_value = "edu_avatar_audio")]
        out: PathBuf,
    },

    /// Transcribe a 16 kHz mono PCM/WAV recording as if spoken into the mic
    Listen {
        /// Recording to replay
        #[arg(short, long)]
        input: PathBuf,

        /// Seconds of audio per recognition request
        #[arg(long, default_value_t = 3.0)]
        chunk_secs: f32,
    },

    /// Send one chat turn to the tutoring backend
    Chat {
        /// Message to send
        #[arg(short, long)]
        message: String,

        /// Tutoring mode: assessment, training or free
        #[arg(long, default_value = "free")]
        mode: ChatMode,

        /// Speak the reply
        #[arg(long)]
        speak: bool,

        /// Output directory for spoken audio
        #[arg(long, default_value = "edu_avatar_audio")]
        out: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value
    Get { key: String },
    /// Check the configuration for problems
    Validate,
}

type SharedCredentials = Arc<CredentialCache<FileStore, HttpTokenIssuer>>;

fn credential_cache(config: &Config) -> anyhow::Result<SharedCredentials> {
    let speech = config.speech();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(speech.request_timeout_secs))
        .build()?;
    let store = FileStore::new(config.credential_store_path());
    let issuer = HttpTokenIssuer::with_client(&config.base_url(), client);
    Ok(Arc::new(CredentialCache::with_ttl(
        store,
        issuer,
        chrono::Duration::minutes(i64::from(speech.token_ttl_minutes)),
    )))
}

fn speaker(
    config: &Config,
    credentials: SharedCredentials,
    gender: AvatarGender,
    out: PathBuf,
) -> anyhow::Result<Speaker> {
    let speech = config.speech();
    let synthesizer = AzureSynthesizer::new(&speech)?;
    Ok(Speaker::new(
        Arc::new(synthesizer),
        Arc::new(FileSink::new(out)),
        credentials,
        SpeechState::new(gender),
        speech,
    ))
}

async fn speak(speaker: &Speaker, text: &str) {
    let report = speaker.speak_reply(text).await;
    println!(
        "Spoke {}/{} sentences ({} failed)",
        report.played, report.sentences, report.failed
    );
}

async fn listen(config: &Config, input: PathBuf, chunk_secs: f32) -> anyhow::Result<()> {
    let speech = config.speech();
    let source = Arc::new(
        PcmFileSource::open(&input, chunk_secs)
            .with_context(|| format!("cannot open {}", input.display()))?,
    );
    let engine = AzureRestRecognizer::new(&speech, source.clone())?;
    let recognizer = Recognizer::new(
        Arc::new(engine),
        source,
        credential_cache(config)?,
        SpeechState::default(),
        speech.language.clone(),
    );

    let (tx, mut rx) = tokio::sync::oneshot::channel();
    let started = recognizer
        .start(Box::new(move |transcript| {
            let _ = tx.send(transcript);
        }))
        .await;
    if !started {
        anyhow::bail!("Speech recognition could not be started");
    }

    // Ends when the recording runs out or on Ctrl-C
    let mut phase = recognizer.subscribe_phase();
    tokio::select! {
        _ = phase.wait_for(|p| *p == RecognitionPhase::Idle) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, stopping recognition");
            recognizer.stop().await;
        }
    }

    match rx.try_recv() {
        Ok(transcript) => println!("{transcript}"),
        Err(_) => println!("(nothing recognized)"),
    }
    Ok(())
}

async fn chat(
    config: &Config,
    message: &str,
    mode: ChatMode,
    speak_reply: bool,
    out: PathBuf,
) -> anyhow::Result<()> {
    let client = ChatClient::with_timeout(
        &config.base_url(),
        Duration::from_secs(config.chat_timeout_secs()),
    )?;
    let conversation = Conversation::new(Arc::new(client), config.prompts());
    conversation.set_api_key(config.chat_api_key());
    conversation.set_model(config.chat_model());
    conversation.set_mode(mode);

    match conversation.send_message(message).await {
        SendOutcome::Replied(reply) => {
            println!("{reply}");
            if speak_reply {
                let speaker = speaker(config, credential_cache(config)?, AvatarGender::default(), out)?;
                speak(&speaker, &reply).await;
            }
        }
        SendOutcome::EmptyReply => println!("(empty reply)"),
        SendOutcome::Failed(e) => anyhow::bail!("Chat request failed: {e}"),
        SendOutcome::Ignored => {
            anyhow::bail!("Message not sent: it is blank or no chat API key is configured")
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let config = Config::load(&config_path)?;

    logging::init(&config.logging(), cli.verbose);
    tracing::debug!(path = %config_path.display(), "Loaded config");

    match cli.command {
        Commands::Token => {
            let credential = credential_cache(&config)?.get_credential().await;
            match credential.as_pair() {
                Some((_, region)) => println!("Speech token available (region: {region})"),
                None => anyhow::bail!("Could not get speech token"),
            }
        }
        Commands::Speak { text, gender, out } => {
            let speaker = speaker(&config, credential_cache(&config)?, gender, out)?;
            speak(&speaker, &text).await;
        }
        Commands::Listen { input, chunk_secs } => {
            listen(&config, input, chunk_secs).await?;
        }
        Commands::Chat {
            message,
            mode,
            speak,
            out,
        } => {
            chat(&config, &message, mode, speak, out).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("No config value at '{key}'"),
            },
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for warning in &warnings {
                    println!("warning: {warning}");
                }
                for error in &errors {
                    println!("error: {error}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} configuration error(s)", errors.len());
                }
                println!("Config OK: {}", config_path.display());
            }
        },
    }

    Ok(())
}

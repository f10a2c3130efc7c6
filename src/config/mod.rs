//! Configuration management for the parley conversation core

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::{Error, Result};
use file::ParleyConfigFile;

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Agent backend configuration
    pub agent: AgentConfig,

    /// Voice/synthesis configuration
    pub voice: VoiceConfig,

    /// Conversation loop configuration
    pub conversation: ConversationConfig,
}

/// Agent backend configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Base URL of the agent backend
    pub base_url: String,

    /// Opaque session token carried unchanged on every request in a turn
    pub session_id: String,

    /// Optional bearer token
    pub auth_token: Option<SecretString>,

    /// Prefer the streaming endpoint over bulk replies
    pub streaming: bool,
}

/// Which synthesis provider handles cloud TTS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtsProvider {
    /// `OpenAI` speech API
    #[default]
    OpenAi,

    /// ElevenLabs API
    ElevenLabs,

    /// Local engine only (no cloud provider)
    Local,
}

/// Voice/synthesis configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Enable text-to-speech output
    pub tts_enabled: bool,

    /// Selected cloud provider
    pub provider: TtsProvider,

    /// `OpenAI` API key
    pub openai_api_key: Option<SecretString>,

    /// ElevenLabs API key
    pub elevenlabs_api_key: Option<SecretString>,

    /// Provider model override (e.g. "tts-1")
    pub model: Option<String>,

    /// Provider voice identifier
    pub voice: String,

    /// TTS speed multiplier
    pub speed: f32,

    /// Local engine voice
    pub local_voice: String,

    /// Local engine speaking rate in words per minute
    pub local_rate_wpm: u32,
}

/// Conversation loop configuration
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Re-arm listening after the assistant finishes speaking
    pub continuous: bool,

    /// How long listening keeps retrying timeout/no-match errors
    pub listen_retry_window: Duration,

    /// Optional cap on recognizer attempts within the window
    pub max_listen_attempts: Option<u32>,

    /// Settling delay before re-arming listening (lets the audio output
    /// device release focus)
    pub settle_delay: Duration,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            tts_enabled: true,
            provider: TtsProvider::default(),
            openai_api_key: None,
            elevenlabs_api_key: None,
            model: None,
            voice: "alloy".to_string(),
            speed: 1.0,
            local_voice: "en".to_string(),
            local_rate_wpm: 170,
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            continuous: true,
            listen_retry_window: Duration::from_secs(5),
            max_listen_attempts: None,
            settle_delay: Duration::from_millis(300),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            session_id: format!("cli-{}", uuid::Uuid::new_v4()),
            auth_token: None,
            streaming: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            voice: VoiceConfig::default(),
            conversation: ConversationConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration: defaults, then TOML file overlay, then
    /// environment variables
    ///
    /// # Errors
    ///
    /// Returns error if the config file exists but cannot be parsed
    pub fn load(path_override: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        let path = path_override.map_or_else(Self::default_path, |p| Some(p.to_path_buf()));
        if let Some(path) = path {
            if path.exists() {
                let raw = std::fs::read_to_string(&path)?;
                let overlay: ParleyConfigFile = toml::from_str(&raw)?;
                config.apply_file(overlay)?;
                tracing::debug!(path = %path.display(), "loaded config file");
            } else if path_override.is_some() {
                return Err(Error::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
        }

        config.apply_env();
        Ok(config)
    }

    /// Default config file path (`~/.config/omni/parley/config.toml`)
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "omni", "parley")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    fn apply_file(&mut self, overlay: ParleyConfigFile) -> Result<()> {
        if let Some(v) = overlay.agent.base_url {
            self.agent.base_url = v;
        }
        if let Some(v) = overlay.agent.session_id {
            self.agent.session_id = v;
        }
        if let Some(v) = overlay.agent.auth_token {
            self.agent.auth_token = Some(SecretString::from(v));
        }
        if let Some(v) = overlay.agent.streaming {
            self.agent.streaming = v;
        }

        if let Some(v) = overlay.voice.tts_enabled {
            self.voice.tts_enabled = v;
        }
        if let Some(v) = overlay.voice.provider {
            self.voice.provider = parse_provider(&v)?;
        }
        if let Some(v) = overlay.voice.model {
            self.voice.model = Some(v);
        }
        if let Some(v) = overlay.voice.voice {
            self.voice.voice = v;
        }
        if let Some(v) = overlay.voice.speed {
            self.voice.speed = v;
        }
        if let Some(v) = overlay.voice.local_voice {
            self.voice.local_voice = v;
        }
        if let Some(v) = overlay.voice.local_rate_wpm {
            self.voice.local_rate_wpm = v;
        }

        if let Some(v) = overlay.api_keys.openai {
            self.voice.openai_api_key = Some(SecretString::from(v));
        }
        if let Some(v) = overlay.api_keys.elevenlabs {
            self.voice.elevenlabs_api_key = Some(SecretString::from(v));
        }

        if let Some(v) = overlay.conversation.continuous {
            self.conversation.continuous = v;
        }
        if let Some(v) = overlay.conversation.listen_retry_window_secs {
            self.conversation.listen_retry_window = Duration::from_secs(v);
        }
        if let Some(v) = overlay.conversation.max_listen_attempts {
            self.conversation.max_listen_attempts = Some(v);
        }
        if let Some(v) = overlay.conversation.settle_delay_ms {
            self.conversation.settle_delay = Duration::from_millis(v);
        }

        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("PARLEY_AGENT_URL") {
            self.agent.base_url = v;
        }
        if let Ok(v) = std::env::var("PARLEY_SESSION_ID") {
            self.agent.session_id = v;
        }
        if let Ok(v) = std::env::var("PARLEY_AUTH_TOKEN") {
            self.agent.auth_token = Some(SecretString::from(v));
        }
        if let Ok(v) = std::env::var("PARLEY_STREAMING") {
            self.agent.streaming = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            if !v.is_empty() {
                self.voice.openai_api_key = Some(SecretString::from(v));
            }
        }
        if let Ok(v) = std::env::var("ELEVENLABS_API_KEY") {
            if !v.is_empty() {
                self.voice.elevenlabs_api_key = Some(SecretString::from(v));
            }
        }
        if let Ok(v) = std::env::var("PARLEY_TTS_PROVIDER") {
            if let Ok(provider) = parse_provider(&v) {
                self.voice.provider = provider;
            }
        }
        if let Ok(v) = std::env::var("PARLEY_CONTINUOUS") {
            self.conversation.continuous = matches!(v.as_str(), "1" | "true" | "yes");
        }
    }
}

/// Parse a provider name from config
fn parse_provider(name: &str) -> Result<TtsProvider> {
    match name.to_lowercase().as_str() {
        "openai" => Ok(TtsProvider::OpenAi),
        "elevenlabs" => Ok(TtsProvider::ElevenLabs),
        "local" | "espeak" => Ok(TtsProvider::Local),
        other => Err(Error::Config(format!("unknown TTS provider \"{other}\""))),
    }
}

//! TOML configuration file loading
//!
//! Supports `~/.config/omni/parley/config.toml` as a persistent config
//! source. All fields are optional — the file is a partial overlay on top
//! of defaults.

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ParleyConfigFile {
    /// Agent backend configuration
    #[serde(default)]
    pub agent: AgentFileConfig,

    /// Voice/synthesis configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Conversation loop configuration
    #[serde(default)]
    pub conversation: ConversationFileConfig,

    /// API keys for cloud synthesis providers
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Agent backend configuration
#[derive(Debug, Default, Deserialize)]
pub struct AgentFileConfig {
    /// Base URL of the agent backend
    pub base_url: Option<String>,

    /// Session token carried on every request
    pub session_id: Option<String>,

    /// Bearer token for authenticated backends
    pub auth_token: Option<String>,

    /// Prefer the streaming endpoint over bulk replies
    pub streaming: Option<bool>,
}

/// Voice/synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Enable text-to-speech output
    pub tts_enabled: Option<bool>,

    /// Cloud provider ("openai", "elevenlabs", or "local")
    pub provider: Option<String>,

    /// Provider model (e.g. "tts-1")
    pub model: Option<String>,

    /// Provider voice identifier (e.g. "alloy")
    pub voice: Option<String>,

    /// TTS speed multiplier
    pub speed: Option<f32>,

    /// Local engine voice (e.g. "en")
    pub local_voice: Option<String>,

    /// Local engine speaking rate in words per minute
    pub local_rate_wpm: Option<u32>,
}

/// Conversation loop configuration
#[derive(Debug, Default, Deserialize)]
pub struct ConversationFileConfig {
    /// Re-arm listening after the assistant finishes speaking
    pub continuous: Option<bool>,

    /// Listening retry window in seconds
    pub listen_retry_window_secs: Option<u64>,

    /// Optional cap on recognizer attempts within the window
    pub max_listen_attempts: Option<u32>,

    /// Settling delay before re-arming listening, in milliseconds
    pub settle_delay_ms: Option<u64>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub elevenlabs: Option<String>,
}

//! Text-to-speech providers
//!
//! Synthesis is a capability with a fixed contract: synthesize text to
//! audio bytes, list voices, validate configuration. The pipeline is
//! provider-agnostic; new providers are added by implementing
//! [`Synthesizer`].

mod elevenlabs;
mod espeak;
mod openai;

use async_trait::async_trait;

pub use elevenlabs::ElevenLabsSynthesizer;
pub use espeak::EspeakSynthesizer;
pub use openai::OpenAiSynthesizer;

use crate::Result;

/// A voice offered by a synthesis provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// Provider-specific voice identifier
    pub id: String,

    /// Human-readable name, when the provider distinguishes one
    pub name: Option<String>,
}

/// Text-to-speech capability
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Provider name for logs and diagnostics
    fn name(&self) -> &str;

    /// Synthesize one sentence unit to audio bytes (MP3 or WAV)
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    /// List the provider's available voices
    async fn voices(&self) -> Result<Vec<Voice>>;

    /// Check that the provider is usable with its current configuration
    async fn validate(&self) -> Result<()>;
}

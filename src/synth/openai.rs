//! `OpenAI` speech synthesis provider

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{Synthesizer, Voice};
use crate::{Error, Result};

/// Voices offered by the `OpenAI` speech API
const OPENAI_VOICES: &[&str] = &[
    "alloy", "ash", "coral", "echo", "fable", "nova", "onyx", "sage", "shimmer",
];

/// Synthesizes speech via the `OpenAI` speech API (MP3 output)
pub struct OpenAiSynthesizer {
    client: reqwest::Client,
    api_key: SecretString,
    voice: String,
    speed: f32,
    model: String,
}

impl OpenAiSynthesizer {
    /// Create a new `OpenAI` synthesizer
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn new(api_key: SecretString, voice: String, speed: f32) -> Result<Self> {
        Self::with_model(api_key, voice, speed, "tts-1".to_string())
    }

    /// Create a new `OpenAI` synthesizer with a custom model
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn with_model(
        api_key: SecretString,
        voice: String,
        speed: f32,
        model: String,
    ) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
            speed,
            model,
        })
    }
}

#[async_trait]
impl Synthesizer for OpenAiSynthesizer {
    fn name(&self) -> &str {
        "openai"
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct SpeechRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }

    async fn voices(&self) -> Result<Vec<Voice>> {
        Ok(OPENAI_VOICES
            .iter()
            .map(|id| Voice {
                id: (*id).to_string(),
                name: None,
            })
            .collect())
    }

    async fn validate(&self) -> Result<()> {
        if !OPENAI_VOICES.contains(&self.voice.as_str()) {
            return Err(Error::Config(format!(
                "unknown OpenAI voice \"{}\"",
                self.voice
            )));
        }
        Ok(())
    }
}

//! Local fallback synthesis via the espeak-ng engine
//!
//! Used for the whole utterance whenever the configured cloud provider is
//! unavailable. Output is WAV on stdout, decoded by the audio sink.

use async_trait::async_trait;
use tokio::process::Command;

use super::{Synthesizer, Voice};
use crate::{Error, Result};

/// Default speaking rate in words per minute
const DEFAULT_RATE_WPM: u32 = 170;

/// Synthesizes speech with a local espeak-ng subprocess
pub struct EspeakSynthesizer {
    voice: String,
    rate_wpm: u32,
}

impl EspeakSynthesizer {
    /// Create a local synthesizer with the default English voice
    #[must_use]
    pub fn new() -> Self {
        Self {
            voice: "en".to_string(),
            rate_wpm: DEFAULT_RATE_WPM,
        }
    }

    /// Create a local synthesizer with a specific voice and rate
    #[must_use]
    pub fn with_voice(voice: String, rate_wpm: u32) -> Self {
        Self { voice, rate_wpm }
    }
}

impl Default for EspeakSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Synthesizer for EspeakSynthesizer {
    fn name(&self) -> &str {
        "espeak"
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let output = Command::new("espeak-ng")
            .arg("--stdout")
            .arg("-v")
            .arg(&self.voice)
            .arg("-s")
            .arg(self.rate_wpm.to_string())
            .arg(text)
            .output()
            .await
            .map_err(|e| Error::Tts(format!("espeak-ng spawn failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Tts(format!(
                "espeak-ng failed (exit {}): {}",
                output.status,
                stderr.trim()
            )));
        }

        if output.stdout.is_empty() {
            return Err(Error::Tts("espeak-ng produced no audio".to_string()));
        }

        Ok(output.stdout)
    }

    async fn voices(&self) -> Result<Vec<Voice>> {
        let output = Command::new("espeak-ng")
            .arg("--voices")
            .output()
            .await
            .map_err(|e| Error::Tts(format!("espeak-ng spawn failed: {e}")))?;

        // Table format: "Pty Language Age/Gender VoiceName File Other"
        let listing = String::from_utf8_lossy(&output.stdout);
        let voices = listing
            .lines()
            .skip(1)
            .filter_map(|line| {
                let mut cols = line.split_whitespace();
                let _priority = cols.next()?;
                let language = cols.next()?;
                let _age_gender = cols.next()?;
                let name = cols.next()?;
                Some(Voice {
                    id: language.to_string(),
                    name: Some(name.to_string()),
                })
            })
            .collect();

        Ok(voices)
    }

    async fn validate(&self) -> Result<()> {
        let status = Command::new("espeak-ng")
            .arg("--version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await
            .map_err(|_| {
                Error::Config("espeak-ng not found; install it for local synthesis".to_string())
            })?;

        if !status.success() {
            return Err(Error::Config("espeak-ng is not runnable".to_string()));
        }
        Ok(())
    }
}

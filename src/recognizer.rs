//! Speech recognition capability seam
//!
//! The on-device recognizer is an external collaborator; the coordinator
//! only needs "one attempt at recognizing speech" with partial results
//! delivered along the way.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How a failed recognition attempt should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizeErrorKind {
    /// No speech detected within the engine's window
    Timeout,

    /// Speech detected but nothing recognizable
    NoMatch,

    /// Any other engine failure
    Other,
}

/// Error from a single recognition attempt
#[derive(Debug, Clone, Error)]
#[error("recognition failed ({kind:?}): {message}")]
pub struct RecognizeError {
    /// Classification used by the coordinator's retry loop
    pub kind: RecognizeErrorKind,

    /// Engine-reported detail
    pub message: String,
}

impl RecognizeError {
    /// A no-speech timeout
    #[must_use]
    pub fn timeout() -> Self {
        Self {
            kind: RecognizeErrorKind::Timeout,
            message: "no speech detected".to_string(),
        }
    }

    /// Speech that produced no usable transcription
    #[must_use]
    pub fn no_match() -> Self {
        Self {
            kind: RecognizeErrorKind::NoMatch,
            message: "speech not recognized".to_string(),
        }
    }

    /// A terminal engine failure
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: RecognizeErrorKind::Other,
            message: message.into(),
        }
    }

    /// Whether the listening loop may retry after this error
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            RecognizeErrorKind::Timeout | RecognizeErrorKind::NoMatch
        )
    }
}

/// One-shot speech recognition.
///
/// Each call runs a single attempt: partial transcriptions are sent through
/// `partials` as they improve (each replaces the previous guess), and the
/// attempt resolves with the final transcription or a classified error.
/// Cancelling `cancel` aborts the attempt; implementations must release
/// microphone resources before returning, so a subsequent attempt can start
/// immediately.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Run one recognition attempt
    async fn recognize(
        &self,
        partials: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> std::result::Result<String, RecognizeError>;
}

/// Recognizer for deployments without an on-device engine (typed input
/// only). Every attempt fails terminally.
pub struct DisabledRecognizer;

#[async_trait]
impl SpeechRecognizer for DisabledRecognizer {
    async fn recognize(
        &self,
        _partials: mpsc::Sender<String>,
        _cancel: CancellationToken,
    ) -> std::result::Result<String, RecognizeError> {
        Err(RecognizeError::other("no speech recognizer configured"))
    }
}

//! Observable conversation state
//!
//! A single writer (the coordinator task) publishes the latest snapshot
//! through a `tokio::sync::watch` slot; any number of observers read the
//! most recent fully-formed value without blocking the writer.

/// Phase of the current conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    /// No active turn
    #[default]
    Idle,

    /// Microphone owned by the recognizer, waiting for speech
    Listening,

    /// Waiting for the agent's reply
    Thinking,

    /// Synthesis/playback pipeline owns the audio device
    Speaking,
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
        };
        f.write_str(s)
    }
}

/// Latest conversation state, published for a presentation layer to render
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    /// Current turn phase
    pub state: TurnState,

    /// Best current transcription guess while listening (replaced, not
    /// accumulated); empty outside `Listening`
    pub partial_text: String,

    /// Whether a final transcription was produced this turn
    pub has_spoken: bool,

    /// Last reply text from the agent, if any
    pub reply: Option<String>,

    /// Model that produced the last reply, when reported
    pub model: Option<String>,

    /// Last turn-level error, cleared when a new turn starts
    pub error: Option<String>,
}

//! Parley - conversational turn-taking core for voice assistant clients
//!
//! This library turns a streamed or bulk text reply from a remote agent
//! into spoken audio with minimal latency, while coordinating speech
//! recognition, synthesis playback, and a continuous conversation loop
//! that re-arms listening after the assistant finishes speaking.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Injected capabilities                │
//! │  Recognizer │ Agent transport │ Hotword │ Audio out │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │              Conversation coordinator                │
//! │     Idle → Listening → Thinking → Speaking ⟳        │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │            Synthesis/playback pipeline               │
//! │  SSE decoder → segmenter → TTS ⇉ ordered playback   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod audio;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod hotword;
pub mod pipeline;
pub mod recognizer;
pub mod segment;
pub mod state;
pub mod stream;
pub mod synth;

pub use agent::{AgentClient, AgentReply, AgentTransport};
pub use audio::{AudioChunk, AudioSink, CpalSink};
pub use config::{Config, TtsProvider};
pub use coordinator::{Coordinator, CoordinatorHandle};
pub use error::{Error, Result};
pub use hotword::{HotwordControl, NoopHotword};
pub use pipeline::SpeechPipeline;
pub use recognizer::{
    DisabledRecognizer, RecognizeError, RecognizeErrorKind, SpeechRecognizer,
};
pub use segment::{SentenceUnit, find_boundary, split_sentences};
pub use state::{Snapshot, TurnState};
pub use stream::{SseDecoder, StreamEvent, decode_stream};
pub use synth::{
    ElevenLabsSynthesizer, EspeakSynthesizer, OpenAiSynthesizer, Synthesizer, Voice,
};

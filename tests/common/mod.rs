//! Shared test fakes for the capability seams
//!
//! None of these touch audio hardware or the network; they record what the
//! core asked of them so tests can assert ordering and call patterns.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use parley::agent::{AgentReply, AgentTransport};
use parley::audio::{AudioChunk, AudioSink};
use parley::hotword::HotwordControl;
use parley::recognizer::{RecognizeError, SpeechRecognizer};
use parley::stream::StreamEvent;
use parley::synth::{Synthesizer, Voice};
use parley::{Error, Result};

/// Records played chunks in arrival order
pub struct RecordingSink {
    played: Mutex<Vec<(usize, Vec<u8>)>>,
    /// Simulated playback duration per chunk
    delay: Duration,
    /// Chunk indices whose playback fails
    fail_indices: HashSet<usize>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::from_millis(1))
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            played: Mutex::new(Vec::new()),
            delay,
            fail_indices: HashSet::new(),
        })
    }

    pub fn failing_on(delay: Duration, fail_indices: impl IntoIterator<Item = usize>) -> Arc<Self> {
        Arc::new(Self {
            played: Mutex::new(Vec::new()),
            delay,
            fail_indices: fail_indices.into_iter().collect(),
        })
    }

    /// Indices in the order they were played
    pub fn played_indices(&self) -> Vec<usize> {
        self.played.lock().unwrap().iter().map(|(i, _)| *i).collect()
    }

    /// Played payloads decoded as strings
    pub fn played_payloads(&self) -> Vec<String> {
        self.played
            .lock()
            .unwrap()
            .iter()
            .map(|(_, bytes)| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn play(&self, chunk: AudioChunk) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        let failed = self.fail_indices.contains(&chunk.index);
        self.played.lock().unwrap().push((chunk.index, chunk.bytes));
        if failed {
            return Err(Error::Audio(format!("sink refused chunk {}", chunk.index)));
        }
        Ok(())
    }
}

/// Synthesizer fake with per-call latency and scripted failures
pub struct FakeSynth {
    name: &'static str,
    calls: AtomicUsize,
    texts: Mutex<Vec<String>>,
    /// Latency per call, cycled; empty means immediate
    latencies_ms: Vec<u64>,
    /// Calls that fail (by text containment)
    fail_on: Vec<String>,
    /// validate() outcome
    valid: bool,
}

impl FakeSynth {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
            latencies_ms: Vec::new(),
            fail_on: Vec::new(),
            valid: true,
        })
    }

    pub fn with_latencies(name: &'static str, latencies_ms: Vec<u64>) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
            latencies_ms,
            fail_on: Vec::new(),
            valid: true,
        })
    }

    pub fn failing_on(name: &'static str, fail_on: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
            latencies_ms: Vec::new(),
            fail_on,
            valid: true,
        })
    }

    pub fn invalid(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
            latencies_ms: Vec::new(),
            fail_on: Vec::new(),
            valid: false,
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for FakeSynth {
    fn name(&self) -> &str {
        self.name
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.latencies_ms.is_empty() {
            let ms = self.latencies_ms[call % self.latencies_ms.len()];
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        if self.fail_on.iter().any(|marker| text.contains(marker)) {
            return Err(Error::Tts(format!("{} refused \"{text}\"", self.name)));
        }

        self.texts.lock().unwrap().push(text.to_string());
        Ok(format!("{}:{}", self.name, text).into_bytes())
    }

    async fn voices(&self) -> Result<Vec<Voice>> {
        Ok(vec![Voice {
            id: "fake".to_string(),
            name: None,
        }])
    }

    async fn validate(&self) -> Result<()> {
        if self.valid {
            Ok(())
        } else {
            Err(Error::Config(format!("{} has no credentials", self.name)))
        }
    }
}

/// One scripted recognizer attempt
pub enum ListenStep {
    /// Send partials, then resolve with a final transcription
    Final {
        partials: Vec<&'static str>,
        text: &'static str,
    },
    /// Resolve with a timeout error after a simulated listening period
    TimeoutAfter(Duration),
    /// Resolve with a terminal error
    Fail(&'static str),
    /// Block until the attempt is cancelled
    Hang,
}

/// Recognizer that replays a script, one step per attempt
pub struct ScriptedRecognizer {
    steps: Mutex<std::collections::VecDeque<ListenStep>>,
    attempts: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn new(steps: Vec<ListenStep>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    async fn recognize(
        &self,
        partials: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> std::result::Result<String, RecognizeError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(ListenStep::Final {
                partials: partial_texts,
                text,
            }) => {
                for partial in partial_texts {
                    let _ = partials.send(partial.to_string()).await;
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Ok(text.to_string())
            }
            Some(ListenStep::TimeoutAfter(duration)) => {
                tokio::select! {
                    () = tokio::time::sleep(duration) => Err(RecognizeError::timeout()),
                    () = cancel.cancelled() => Err(RecognizeError::other("cancelled")),
                }
            }
            Some(ListenStep::Fail(message)) => Err(RecognizeError::other(message)),
            Some(ListenStep::Hang) | None => {
                cancel.cancelled().await;
                // Late callback after a stop; the coordinator must never
                // surface it.
                let _ = partials.try_send("late partial".to_string());
                Err(RecognizeError::other("cancelled"))
            }
        }
    }
}

/// Counts hotword pause/resume signals
pub struct CountingHotword {
    pub pauses: AtomicUsize,
    pub resumes: AtomicUsize,
}

impl CountingHotword {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pauses: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
        })
    }

    pub fn pause_count(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }

    pub fn resume_count(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HotwordControl for CountingHotword {
    async fn pause(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }

    async fn resume(&self) {
        self.resumes.fetch_add(1, Ordering::SeqCst);
    }
}

/// What the fake agent should do for a turn
pub enum AgentScript {
    Reply(AgentReply),
    ReplyEvents(Vec<StreamEvent>),
    Fail(&'static str),
}

/// Agent transport fake
pub struct FakeAgent {
    script: Mutex<std::collections::VecDeque<AgentScript>>,
    pub audio_bytes: Vec<u8>,
    sends: AtomicUsize,
}

impl FakeAgent {
    pub fn new(script: Vec<AgentScript>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            audio_bytes: b"prefetched-audio".to_vec(),
            sends: AtomicUsize::new(0),
        })
    }

    pub fn replying(text: &str) -> Arc<Self> {
        Self::new(vec![AgentScript::Reply(AgentReply {
            text: text.to_string(),
            model: None,
            audio_url: None,
        })])
    }

    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    fn next(&self) -> Option<AgentScript> {
        self.script.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl AgentTransport for FakeAgent {
    async fn send(&self, _message: &str) -> Result<AgentReply> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        // Simulated network latency; also gives state observers a chance
        // to see the thinking phase.
        tokio::time::sleep(Duration::from_millis(5)).await;
        match self.next() {
            Some(AgentScript::Reply(reply)) => Ok(reply),
            Some(AgentScript::Fail(message)) => Err(Error::Transport(message.to_string())),
            Some(AgentScript::ReplyEvents(_)) | None => {
                Err(Error::Transport("no scripted reply".to_string()))
            }
        }
    }

    async fn send_streaming(&self, _message: &str) -> Result<BoxStream<'static, StreamEvent>> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        match self.next() {
            Some(AgentScript::ReplyEvents(events)) => {
                Ok(futures::stream::iter(events).boxed())
            }
            Some(AgentScript::Fail(message)) => Err(Error::Transport(message.to_string())),
            Some(AgentScript::Reply(_)) | None => {
                Err(Error::Transport("no scripted stream".to_string()))
            }
        }
    }

    async fn fetch_audio(&self, _url: &str) -> Result<Vec<u8>> {
        Ok(self.audio_bytes.clone())
    }
}

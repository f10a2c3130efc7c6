//! Conversation coordinator (turn state machine)
//!
//! Sequences `Idle → Listening → Thinking → Speaking → (Listening | Idle)`
//! with barge-in, timeout, and cancellation semantics. All triggers —
//! commands, recognizer outcomes, pipeline completion — funnel through one
//! task, so state transitions are totally ordered and the recognizer and
//! the playback pipeline never run at the same time (half-duplex audio
//! device).
//!
//! No error is ever allowed to terminate the coordinator task itself; every
//! failure becomes user-visible state (an error message and a return to
//! idle).

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::agent::AgentTransport;
use crate::config::Config;
use crate::hotword::HotwordControl;
use crate::pipeline::SpeechPipeline;
use crate::recognizer::SpeechRecognizer;
use crate::state::{Snapshot, TurnState};
use crate::stream::StreamEvent;
use crate::{Error, Result};

/// Command channel depth
const COMMAND_BUFFER: usize = 16;

/// Requests accepted by the coordinator
#[derive(Debug)]
enum Command {
    StartListening,
    StopListening,
    StopSpeaking,
    SubmitText(String),
}

/// How a turn entered the state machine
enum TurnEntry {
    Voice,
    Typed(String),
}

/// Next phase within an active conversation
enum TurnPhase {
    Listen,
    Think(String),
}

/// Where a listening phase ended up
enum ListenOutcome {
    Final(String),
    Stopped,
    Failed(String),
}

/// Where a speaking phase ended up
enum SpeakOutcome {
    Completed,
    Degraded(String),
    Failed(String),
    Stopped,
    BargeIn,
}

/// How a think/speak phase ended
enum TurnEnd {
    Relisten,
    Done,
    Stopped,
    BargeIn,
}

/// Client handle for submitting commands and observing state
#[derive(Clone)]
pub struct CoordinatorHandle {
    cmd_tx: mpsc::Sender<Command>,
    snapshot_rx: watch::Receiver<Snapshot>,
}

impl CoordinatorHandle {
    /// Begin a voice turn (idempotent while already listening)
    ///
    /// # Errors
    ///
    /// Returns error if the coordinator task has stopped
    pub async fn start_listening(&self) -> Result<()> {
        self.send(Command::StartListening).await
    }

    /// Cancel listening and return to idle
    ///
    /// # Errors
    ///
    /// Returns error if the coordinator task has stopped
    pub async fn stop_listening(&self) -> Result<()> {
        self.send(Command::StopListening).await
    }

    /// Cancel speech playback and return to idle
    ///
    /// # Errors
    ///
    /// Returns error if the coordinator task has stopped
    pub async fn stop_speaking(&self) -> Result<()> {
        self.send(Command::StopSpeaking).await
    }

    /// Run a typed turn (no listening phase)
    ///
    /// # Errors
    ///
    /// Returns error if the coordinator task has stopped
    pub async fn submit_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Command::SubmitText(text.into())).await
    }

    /// Latest published snapshot
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Subscribe to snapshot updates
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_rx.clone()
    }

    async fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| Error::Agent("conversation coordinator is not running".to_string()))
    }
}

/// The conversation turn state machine
pub struct Coordinator {
    config: Config,
    agent: Arc<dyn AgentTransport>,
    recognizer: Arc<dyn SpeechRecognizer>,
    hotword: Arc<dyn HotwordControl>,
    pipeline: Arc<SpeechPipeline>,
    cmd_rx: mpsc::Receiver<Command>,
    snapshot_tx: watch::Sender<Snapshot>,
}

impl Coordinator {
    /// Create a coordinator and its client handle
    #[must_use]
    pub fn new(
        config: Config,
        agent: Arc<dyn AgentTransport>,
        recognizer: Arc<dyn SpeechRecognizer>,
        hotword: Arc<dyn HotwordControl>,
        pipeline: Arc<SpeechPipeline>,
    ) -> (Self, CoordinatorHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::default());

        let coordinator = Self {
            config,
            agent,
            recognizer,
            hotword,
            pipeline,
            cmd_rx,
            snapshot_tx,
        };
        let handle = CoordinatorHandle {
            cmd_tx,
            snapshot_rx,
        };

        (coordinator, handle)
    }

    /// Run until every handle is dropped
    pub async fn run(mut self) {
        tracing::info!("conversation coordinator running");

        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                Command::StartListening => self.run_conversation(TurnEntry::Voice).await,
                Command::SubmitText(text) => {
                    self.run_conversation(TurnEntry::Typed(text)).await;
                }
                Command::StopListening | Command::StopSpeaking => {
                    tracing::debug!("already idle, ignoring stop");
                }
            }
        }

        tracing::info!("conversation coordinator stopped");
    }

    /// One conversation: a voice turn loops while continuous mode re-arms
    /// listening; a typed turn runs once unless barged into
    async fn run_conversation(&mut self, entry: TurnEntry) {
        let mut voice_initiated = matches!(entry, TurnEntry::Voice);

        self.publish(|s| {
            s.error = None;
            s.has_spoken = false;
        });

        if voice_initiated {
            // Hotword detection and this core share the microphone; any
            // in-progress speech is cut off (barge-in).
            self.hotword.pause().await;
            self.pipeline.stop();
        }

        let mut phase = match entry {
            TurnEntry::Voice => TurnPhase::Listen,
            TurnEntry::Typed(text) => TurnPhase::Think(text),
        };

        loop {
            phase = match phase {
                TurnPhase::Listen => match self.listen_phase().await {
                    ListenOutcome::Final(text) => TurnPhase::Think(text),
                    ListenOutcome::Stopped => break,
                    ListenOutcome::Failed(message) => {
                        self.fail_turn(&message);
                        break;
                    }
                },
                TurnPhase::Think(text) => {
                    match self.think_and_speak(&text, voice_initiated).await {
                        TurnEnd::Relisten => TurnPhase::Listen,
                        TurnEnd::BargeIn => {
                            if !voice_initiated {
                                self.hotword.pause().await;
                                voice_initiated = true;
                            }
                            TurnPhase::Listen
                        }
                        TurnEnd::Done | TurnEnd::Stopped => break,
                    }
                }
            };
        }

        self.publish(|s| {
            s.state = TurnState::Idle;
            s.partial_text.clear();
            s.has_spoken = false;
        });

        if voice_initiated {
            self.hotword.resume().await;
        }
    }

    /// Listening: restart the recognizer in a loop until a final
    /// transcription, a stop, or the retry window closes
    async fn listen_phase(&mut self) -> ListenOutcome {
        self.publish(|s| {
            s.state = TurnState::Listening;
            s.partial_text.clear();
        });

        let window_start = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            if let Some(cap) = self.config.conversation.max_listen_attempts {
                if attempts >= cap {
                    return ListenOutcome::Failed(format!(
                        "no speech after {attempts} attempts"
                    ));
                }
            }
            attempts += 1;

            let (partial_tx, mut partial_rx) = mpsc::channel(8);
            let attempt_cancel = CancellationToken::new();
            let attempt = {
                let recognizer = Arc::clone(&self.recognizer);
                let cancel = attempt_cancel.clone();
                async move { recognizer.recognize(partial_tx, cancel).await }
            };
            tokio::pin!(attempt);

            let result = loop {
                tokio::select! {
                    cmd = self.cmd_rx.recv() => match cmd {
                        Some(Command::StopListening | Command::StopSpeaking) | None => {
                            // Release the microphone before anything else
                            // may start it; late callbacks land in a
                            // dropped channel and are ignored.
                            attempt_cancel.cancel();
                            let _ = attempt.as_mut().await;
                            return ListenOutcome::Stopped;
                        }
                        Some(Command::StartListening) => {
                            tracing::debug!("already listening, ignoring start");
                        }
                        Some(Command::SubmitText(_)) => {
                            tracing::debug!("typed input ignored while listening");
                        }
                    },
                    Some(partial) = partial_rx.recv() => {
                        self.publish(|s| s.partial_text = partial);
                    }
                    result = attempt.as_mut() => break result,
                }
            };

            match result {
                Ok(text) if !text.trim().is_empty() => {
                    self.publish(|s| {
                        s.has_spoken = true;
                        s.partial_text.clear();
                    });
                    return ListenOutcome::Final(text);
                }
                Ok(_) => {
                    if !self.may_retry(window_start) {
                        return ListenOutcome::Failed("no speech detected".to_string());
                    }
                }
                Err(e) if e.is_retryable() => {
                    if !self.may_retry(window_start) {
                        return ListenOutcome::Failed(e.to_string());
                    }
                    tracing::debug!(attempt = attempts, error = %e, "retrying recognizer");
                }
                Err(e) => return ListenOutcome::Failed(e.to_string()),
            }
        }
    }

    /// Whether the listening loop may restart the recognizer
    fn may_retry(&self, window_start: Instant) -> bool {
        self.config.conversation.continuous
            && window_start.elapsed() < self.config.conversation.listen_retry_window
    }

    /// Thinking then speaking, via the bulk or streaming transport
    async fn think_and_speak(&mut self, text: &str, voice_initiated: bool) -> TurnEnd {
        self.publish(|s| {
            s.state = TurnState::Thinking;
            s.partial_text.clear();
        });

        if self.config.agent.streaming {
            self.speak_streamed(text, voice_initiated).await
        } else {
            self.speak_bulk(text, voice_initiated).await
        }
    }

    /// Bulk turn: send, then speak the complete reply
    async fn speak_bulk(&mut self, text: &str, voice_initiated: bool) -> TurnEnd {
        let reply = match self.agent.send(text).await {
            Ok(reply) => reply,
            Err(e) => {
                self.fail_turn(&format!("send failed: {e}"));
                return TurnEnd::Done;
            }
        };

        self.publish(|s| {
            s.reply = Some(reply.text.clone());
            s.model.clone_from(&reply.model);
        });

        if !self.config.voice.tts_enabled {
            return self.after_speaking(voice_initiated).await;
        }

        self.publish(|s| s.state = TurnState::Speaking);

        // The coordinator owns the utterance token so a stop command can
        // never race the spawned task's startup.
        let cancel = CancellationToken::new();

        // Server-pre-synthesized audio takes priority over local synthesis.
        let speaking: JoinHandle<Result<()>> = if let Some(url) = reply.audio_url {
            match self.agent.fetch_audio(&url).await {
                Ok(bytes) => {
                    let pipeline = Arc::clone(&self.pipeline);
                    let cancel = cancel.clone();
                    tokio::spawn(async move { pipeline.play_audio_with(bytes, cancel).await })
                }
                Err(e) => {
                    tracing::warn!(error = %e, "reply audio fetch failed, synthesizing locally");
                    let pipeline = Arc::clone(&self.pipeline);
                    let reply_text = reply.text;
                    let cancel = cancel.clone();
                    tokio::spawn(
                        async move { pipeline.speak_text_with(&reply_text, cancel).await },
                    )
                }
            }
        } else {
            let pipeline = Arc::clone(&self.pipeline);
            let reply_text = reply.text;
            let cancel = cancel.clone();
            tokio::spawn(async move { pipeline.speak_text_with(&reply_text, cancel).await })
        };

        self.resolve_speaking(speaking, cancel, voice_initiated).await
    }

    /// Streaming turn: pass text chunks straight into the pipeline's
    /// segmenter as they arrive
    async fn speak_streamed(&mut self, text: &str, voice_initiated: bool) -> TurnEnd {
        let events = match self.agent.send_streaming(text).await {
            Ok(events) => events,
            Err(e) => {
                self.fail_turn(&format!("send failed: {e}"));
                return TurnEnd::Done;
            }
        };

        // Tap the stream so the snapshot still carries the reply text and
        // model once the pipeline has consumed the events.
        let captured = Arc::new(Mutex::new(CapturedReply::default()));
        let tap = Arc::clone(&captured);
        let events = events.map(move |event| {
            tap.lock().unwrap().observe(&event);
            event
        });

        if !self.config.voice.tts_enabled {
            // Drain the stream for its text; nothing to speak.
            let mut events = std::pin::pin!(events);
            let mut failure = None;
            while let Some(event) = events.next().await {
                if let StreamEvent::Error { message } = event {
                    failure = Some(message);
                }
            }
            self.publish_captured(&captured);
            if let Some(message) = failure {
                self.fail_turn(&message);
                return TurnEnd::Done;
            }
            return self.after_speaking(voice_initiated).await;
        }

        self.publish(|s| s.state = TurnState::Speaking);

        let cancel = CancellationToken::new();
        let pipeline = Arc::clone(&self.pipeline);
        let speaking = {
            let cancel = cancel.clone();
            tokio::spawn(async move { pipeline.speak_stream_with(events, cancel).await })
        };

        let end = self.resolve_speaking(speaking, cancel, voice_initiated).await;
        self.publish_captured(&captured);
        end
    }

    /// Drive a speaking task while staying responsive to commands
    async fn resolve_speaking(
        &mut self,
        mut speaking: JoinHandle<Result<()>>,
        cancel: CancellationToken,
        voice_initiated: bool,
    ) -> TurnEnd {
        let outcome = loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::StopSpeaking | Command::StopListening) | None => {
                        cancel.cancel();
                        let _ = (&mut speaking).await;
                        break SpeakOutcome::Stopped;
                    }
                    Some(Command::StartListening) => {
                        // Barge-in: cut playback, hand the device back to
                        // the recognizer.
                        cancel.cancel();
                        let _ = (&mut speaking).await;
                        break SpeakOutcome::BargeIn;
                    }
                    Some(Command::SubmitText(_)) => {
                        tracing::debug!("typed input ignored while speaking");
                    }
                },
                result = &mut speaking => {
                    break match result {
                        Ok(Ok(())) => SpeakOutcome::Completed,
                        Ok(Err(Error::Stream(message))) => SpeakOutcome::Failed(message),
                        Ok(Err(e)) => SpeakOutcome::Degraded(e.to_string()),
                        Err(e) => SpeakOutcome::Degraded(format!("speaking task failed: {e}")),
                    };
                }
            }
        };

        match outcome {
            SpeakOutcome::Completed => self.after_speaking(voice_initiated).await,
            SpeakOutcome::Degraded(message) => {
                // Degraded audio does not block state progression.
                tracing::warn!(error = %message, "utterance degraded");
                self.publish(|s| s.error = Some(message));
                self.after_speaking(voice_initiated).await
            }
            SpeakOutcome::Failed(message) => {
                self.fail_turn(&message);
                TurnEnd::Done
            }
            SpeakOutcome::Stopped => TurnEnd::Stopped,
            SpeakOutcome::BargeIn => TurnEnd::BargeIn,
        }
    }

    /// Continuous-mode continuation after the assistant finished speaking
    async fn after_speaking(&mut self, voice_initiated: bool) -> TurnEnd {
        if voice_initiated && self.config.conversation.continuous {
            // Let the audio output device release focus before re-arming
            // the microphone.
            tokio::time::sleep(self.config.conversation.settle_delay).await;
            TurnEnd::Relisten
        } else {
            TurnEnd::Done
        }
    }

    /// Surface a turn-level failure
    fn fail_turn(&self, message: &str) {
        tracing::warn!(error = %message, "turn failed");
        self.publish(|s| s.error = Some(message.to_string()));
    }

    fn publish(&self, f: impl FnOnce(&mut Snapshot)) {
        self.snapshot_tx.send_modify(f);
    }

    fn publish_captured(&self, captured: &Arc<Mutex<CapturedReply>>) {
        let captured = captured.lock().unwrap();
        if !captured.text.is_empty() {
            let text = captured.text.clone();
            let model = captured.model.clone();
            self.publish(move |s| {
                s.reply = Some(text);
                s.model = model;
            });
        }
    }
}

/// Reply text/model observed while the event stream passes through to the
/// pipeline
#[derive(Default)]
struct CapturedReply {
    text: String,
    model: Option<String>,
}

impl CapturedReply {
    fn observe(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Text { chunk } => self.text.push_str(chunk),
            StreamEvent::Done { full_text, model } => {
                if self.text.is_empty() {
                    self.text.clone_from(full_text);
                }
                self.model.clone_from(model);
            }
            StreamEvent::Error { .. } => {}
        }
    }
}

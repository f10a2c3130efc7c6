//! Synthesis/playback pipeline
//!
//! Turns an ordered sequence of sentence units into spoken audio,
//! overlapping synthesis of unit *n+1* with playback of unit *n*. Playback
//! is a single FIFO consumer: chunk *k* plays to completion before chunk
//! *k+1* starts, regardless of synthesis completion order.
//!
//! Provider choice is per-utterance: if the cloud synthesizer is missing or
//! fails validation, the whole utterance uses the local engine. Mixing
//! providers mid-utterance is disallowed — voice identity must stay
//! consistent within one spoken reply.

use std::sync::{Arc, Mutex};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::audio::{AudioChunk, AudioSink};
use crate::segment::{MAX_BUFFERED_CHARS, find_boundary, split_sentences};
use crate::stream::StreamEvent;
use crate::synth::Synthesizer;
use crate::{Error, Result};

/// How many synthesized-but-unplayed chunks may queue ahead of playback
const LOOKAHEAD_CHUNKS: usize = 4;

/// Minimum buffered characters before the streaming feeder looks for a
/// sentence boundary
const MIN_STREAM_FLUSH_CHARS: usize = 40;

/// Pipelines text-to-speech synthesis against an audio sink
pub struct SpeechPipeline {
    cloud: Option<Arc<dyn Synthesizer>>,
    local: Arc<dyn Synthesizer>,
    sink: Arc<dyn AudioSink>,
    active: Mutex<CancellationToken>,
}

impl SpeechPipeline {
    /// Create a pipeline from an optional cloud synthesizer, a local
    /// fallback, and an audio sink
    #[must_use]
    pub fn new(
        cloud: Option<Arc<dyn Synthesizer>>,
        local: Arc<dyn Synthesizer>,
        sink: Arc<dyn AudioSink>,
    ) -> Self {
        Self {
            cloud,
            local,
            sink,
            active: Mutex::new(CancellationToken::new()),
        }
    }

    /// Stop the current utterance: no further chunks are scheduled;
    /// in-flight synthesis completes and is discarded
    pub fn stop(&self) {
        self.active.lock().unwrap().cancel();
    }

    /// Speak a complete reply text
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tts`] if any unit failed to synthesize or play;
    /// surviving units are still played in order.
    pub async fn speak_text(&self, text: &str) -> Result<()> {
        self.speak_text_with(text, CancellationToken::new()).await
    }

    /// [`Self::speak_text`] under a caller-owned cancellation token.
    ///
    /// The token is registered as the active utterance, so [`Self::stop`]
    /// and cancelling the token are equivalent. A caller that spawns the
    /// utterance can cancel its own token without racing the spawn.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tts`] if any unit failed to synthesize or play.
    pub async fn speak_text_with(&self, text: &str, cancel: CancellationToken) -> Result<()> {
        let units = split_sentences(text);
        if units.is_empty() {
            return Ok(());
        }

        self.register(&cancel);
        if cancel.is_cancelled() {
            return Ok(());
        }

        // Short replies skip the producer/consumer machinery entirely.
        if units.len() == 1 {
            return self.speak_single(&units[0].text, &cancel).await;
        }

        let mut utterance = Utterance::begin(
            self.cloud.clone(),
            Arc::clone(&self.local),
            Arc::clone(&self.sink),
            cancel.clone(),
        )
        .await;

        for unit in units {
            if cancel.is_cancelled() {
                break;
            }
            utterance.push(unit.text).await;
        }

        utterance.finish().await
    }

    /// Speak a reply as it arrives on the event stream
    ///
    /// `Text` chunks feed the sentence boundary probe so synthesis starts
    /// before the reply completes; `Done.full_text` is used only when no
    /// `Text` chunks arrived; an `Error` event fails the utterance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stream`] on a terminal stream error and
    /// [`Error::Tts`] if any unit failed.
    pub async fn speak_stream<S>(&self, events: S) -> Result<()>
    where
        S: Stream<Item = StreamEvent> + Send,
    {
        self.speak_stream_with(events, CancellationToken::new()).await
    }

    /// [`Self::speak_stream`] under a caller-owned cancellation token
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stream`] on a terminal stream error and
    /// [`Error::Tts`] if any unit failed.
    pub async fn speak_stream_with<S>(&self, events: S, cancel: CancellationToken) -> Result<()>
    where
        S: Stream<Item = StreamEvent> + Send,
    {
        self.register(&cancel);

        let mut utterance = Utterance::begin(
            self.cloud.clone(),
            Arc::clone(&self.local),
            Arc::clone(&self.sink),
            cancel.clone(),
        )
        .await;

        let mut buf = String::new();
        let mut got_text = false;
        let mut stream_error: Option<String> = None;
        let mut events = std::pin::pin!(events);

        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => break,
                event = events.next() => event,
            };

            match event {
                Some(StreamEvent::Text { chunk }) => {
                    got_text = true;
                    buf.push_str(&chunk);

                    while let Some(idx) = find_boundary(&buf, MIN_STREAM_FLUSH_CHARS, false) {
                        let unit = buf[..idx].trim().to_string();
                        buf.drain(..idx);
                        if !unit.is_empty() {
                            utterance.push(unit).await;
                        }
                    }

                    // Bound synthesis latency even without a boundary.
                    if buf.chars().count() > MAX_BUFFERED_CHARS {
                        let unit = std::mem::take(&mut buf).trim().to_string();
                        if !unit.is_empty() {
                            utterance.push(unit).await;
                        }
                    }
                }
                Some(StreamEvent::Done { full_text, .. }) => {
                    if got_text {
                        break;
                    }
                    // Bulk-over-stream: no incremental chunks arrived, so
                    // the terminal marker's text is authoritative.
                    for unit in split_sentences(&full_text) {
                        if cancel.is_cancelled() {
                            break;
                        }
                        utterance.push(unit.text).await;
                    }
                    break;
                }
                Some(StreamEvent::Error { message }) => {
                    stream_error = Some(message);
                    break;
                }
                None => break,
            }
        }

        // Flush whatever never reached a boundary; a failed stream's
        // dangling fragment is not spoken.
        if !cancel.is_cancelled() && stream_error.is_none() {
            let remainder = buf.trim();
            if !remainder.is_empty() {
                utterance.push(remainder.to_string()).await;
            }
        }

        let spoken = utterance.finish().await;

        if let Some(message) = stream_error {
            return Err(Error::Stream(message));
        }
        spoken
    }

    /// Play server-pre-synthesized reply audio as a single chunk
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tts`] if playback fails
    pub async fn play_audio(&self, bytes: Vec<u8>) -> Result<()> {
        self.play_audio_with(bytes, CancellationToken::new()).await
    }

    /// [`Self::play_audio`] under a caller-owned cancellation token
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tts`] if playback fails
    pub async fn play_audio_with(&self, bytes: Vec<u8>, cancel: CancellationToken) -> Result<()> {
        self.register(&cancel);
        if cancel.is_cancelled() {
            return Ok(());
        }

        self.sink
            .play(AudioChunk { index: 0, bytes })
            .await
            .map_err(|e| Error::Tts(format!("reply audio playback failed: {e}")))
    }

    /// Direct single-shot path: synthesize then play, no pipeline
    async fn speak_single(&self, text: &str, cancel: &CancellationToken) -> Result<()> {
        let mut selection = select_provider(self.cloud.clone(), Arc::clone(&self.local)).await;

        let bytes = synthesize_with_fallback(&mut selection, text).await.ok_or_else(|| {
            Error::Tts("1 of 1 audio units failed".to_string())
        })?;

        if cancel.is_cancelled() {
            return Ok(());
        }

        self.sink
            .play(AudioChunk { index: 0, bytes })
            .await
            .map_err(|e| Error::Tts(format!("1 of 1 audio units failed: {e}")))
    }

    /// Register the utterance's token so [`Self::stop`] can reach it
    fn register(&self, cancel: &CancellationToken) {
        *self.active.lock().unwrap() = cancel.clone();
    }
}

/// Provider pinned for one utterance
struct ProviderSelection {
    provider: Arc<dyn Synthesizer>,
    local: Arc<dyn Synthesizer>,
    on_fallback: bool,
}

/// Pick the utterance's provider: cloud when configured and valid,
/// otherwise the local engine
async fn select_provider(
    cloud: Option<Arc<dyn Synthesizer>>,
    local: Arc<dyn Synthesizer>,
) -> ProviderSelection {
    match cloud {
        Some(cloud) => match cloud.validate().await {
            Ok(()) => ProviderSelection {
                provider: cloud,
                local,
                on_fallback: false,
            },
            Err(e) => {
                tracing::info!(
                    error = %e,
                    fallback = local.name(),
                    "cloud synthesizer unavailable, using local engine for utterance"
                );
                ProviderSelection {
                    provider: Arc::clone(&local),
                    local,
                    on_fallback: true,
                }
            }
        },
        None => ProviderSelection {
            provider: Arc::clone(&local),
            local,
            on_fallback: true,
        },
    }
}

/// Synthesize the utterance's first unit, switching the whole utterance to
/// the local engine if the cloud call throws before any cloud audio exists
async fn synthesize_with_fallback(
    selection: &mut ProviderSelection,
    text: &str,
) -> Option<Vec<u8>> {
    match selection.provider.synthesize(text).await {
        Ok(bytes) => Some(bytes),
        Err(e) if !selection.on_fallback => {
            tracing::warn!(
                error = %e,
                provider = selection.provider.name(),
                "cloud synthesis failed on first unit, falling back to local engine"
            );
            selection.provider = Arc::clone(&selection.local);
            selection.on_fallback = true;
            match selection.provider.synthesize(text).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    tracing::warn!(error = %e, "local synthesis failed, skipping unit");
                    None
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "synthesis failed, skipping unit");
            None
        }
    }
}

/// A synthesis result travelling to the playback consumer in unit order
struct Pending {
    index: usize,
    handle: JoinHandle<Result<Vec<u8>>>,
}

/// One in-flight utterance: a producer pushing units and a FIFO playback
/// consumer
struct Utterance {
    selection: ProviderSelection,
    tx: Option<mpsc::Sender<Pending>>,
    consumer: JoinHandle<usize>,
    next_index: usize,
    producer_failures: usize,
    cancel: CancellationToken,
}

impl Utterance {
    async fn begin(
        cloud: Option<Arc<dyn Synthesizer>>,
        local: Arc<dyn Synthesizer>,
        sink: Arc<dyn AudioSink>,
        cancel: CancellationToken,
    ) -> Self {
        let selection = select_provider(cloud, local).await;
        let (tx, rx) = mpsc::channel(LOOKAHEAD_CHUNKS);
        let consumer = tokio::spawn(run_consumer(rx, sink, cancel.clone()));

        Self {
            selection,
            tx: Some(tx),
            consumer,
            next_index: 0,
            producer_failures: 0,
            cancel,
        }
    }

    /// Queue one sentence unit for synthesis and ordered playback
    async fn push(&mut self, text: String) {
        if self.cancel.is_cancelled() {
            return;
        }

        let index = self.next_index;
        self.next_index += 1;

        let handle = if index == 0 {
            // The first unit doubles as the provider probe: synthesize it
            // inline so a cloud failure can still move the whole utterance
            // to the local engine before anything else is scheduled.
            match synthesize_with_fallback(&mut self.selection, &text).await {
                Some(bytes) => tokio::spawn(async move { Ok::<_, Error>(bytes) }),
                None => {
                    self.producer_failures += 1;
                    return;
                }
            }
        } else {
            let provider = Arc::clone(&self.selection.provider);
            tokio::spawn(async move { provider.synthesize(&text).await })
        };

        if let Some(tx) = &self.tx {
            if tx.send(Pending { index, handle }).await.is_err() {
                tracing::debug!(index, "playback consumer gone, dropping unit");
            }
        }
    }

    /// Close the input and wait for playback to drain
    async fn finish(mut self) -> Result<()> {
        self.tx.take();

        let consumer_failures = self.consumer.await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "playback consumer task failed");
            1
        });

        if self.cancel.is_cancelled() {
            tracing::debug!("utterance cancelled");
            return Ok(());
        }

        let failed = self.producer_failures + consumer_failures;
        if failed > 0 {
            return Err(Error::Tts(format!(
                "{failed} of {} audio units failed",
                self.next_index
            )));
        }
        Ok(())
    }
}

/// Play chunks strictly in arrival order, one at a time, to completion
async fn run_consumer(
    mut rx: mpsc::Receiver<Pending>,
    sink: Arc<dyn AudioSink>,
    cancel: CancellationToken,
) -> usize {
    let mut failed = 0;

    loop {
        let pending = tokio::select! {
            () = cancel.cancelled() => break,
            pending = rx.recv() => pending,
        };

        let Some(Pending { index, handle }) = pending else {
            break;
        };

        match handle.await {
            Ok(Ok(bytes)) => {
                if let Err(e) = sink.play(AudioChunk { index, bytes }).await {
                    tracing::warn!(index, error = %e, "chunk playback failed");
                    failed += 1;
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(index, error = %e, "unit synthesis failed, skipping");
                failed += 1;
            }
            Err(e) => {
                tracing::warn!(index, error = %e, "synthesis task panicked");
                failed += 1;
            }
        }
    }

    failed
}

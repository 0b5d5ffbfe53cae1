//! Pipeline assembly
//!
//! Wires the stages together: capture feeds raw samples into the segmenter
//! worker, finished utterances flow to the transcription worker, gated
//! transcripts spawn reply tasks, and replies drain through a dedicated
//! speech thread. Every stage blocks on its queue; nothing polls.
//!
//! Reply tasks are fire-and-forget and capped by a semaphore, so replies
//! are spoken in completion order, not utterance order.

use std::sync::{Arc, Mutex};

use tokio::sync::{Semaphore, mpsc};

use crate::audio::{AudioCapture, FrameChunker};
use crate::config::Config;
use crate::context::ContextSources;
use crate::glasses::GlassesController;
use crate::llm::{Responder, build_prompt};
use crate::stt::Transcriber;
use crate::tts::Speaker;
use crate::vad::{Segmenter, UtteranceSegment};
use crate::wake::{Route, WakeGate};
use crate::{Error, Result};

/// The assembled voice pipeline
pub struct Pipeline {
    config: Config,
    gate: WakeGate,
    transcriber: Arc<dyn Transcriber>,
    responder: Arc<dyn Responder>,
    sources: Arc<ContextSources>,
    glasses: Arc<Mutex<GlassesController>>,
}

/// Handles to the running workers
///
/// Workers stop on their own once the audio sample channel closes; `join`
/// waits for the drain to finish, including replies still being spoken.
pub struct PipelineHandle {
    segmenter: tokio::task::JoinHandle<()>,
    transcription: tokio::task::JoinHandle<()>,
    speech: std::thread::JoinHandle<()>,
}

impl PipelineHandle {
    /// Wait for every worker to drain and stop
    pub async fn join(self) {
        let Self {
            segmenter,
            transcription,
            speech,
        } = self;

        let _ = segmenter.await;
        let _ = transcription.await;
        // The speech thread exits once the last reply sender is gone
        let _ = tokio::task::spawn_blocking(move || speech.join()).await;
    }
}

impl Pipeline {
    /// Assemble a pipeline from configuration and collaborators
    #[must_use]
    pub fn new(
        config: Config,
        transcriber: Arc<dyn Transcriber>,
        responder: Arc<dyn Responder>,
        sources: ContextSources,
        glasses: GlassesController,
    ) -> Self {
        let gate = WakeGate::new(&config.triggers);

        Self {
            config,
            gate,
            transcriber,
            responder,
            sources: Arc::new(sources),
            glasses: Arc::new(Mutex::new(glasses)),
        }
    }

    /// Capture from the microphone and run until interrupted
    ///
    /// Must run on the thread that owns the capture stream; cpal streams
    /// aren't `Send`.
    ///
    /// # Errors
    ///
    /// Returns error if no usable input device is found
    #[allow(clippy::future_not_send)]
    pub async fn run<F, S>(self, make_speaker: F) -> Result<()>
    where
        F: FnOnce() -> Result<S> + Send + 'static,
        S: Speaker,
    {
        let (audio_tx, audio_rx) = mpsc::unbounded_channel();

        let capture = AudioCapture::start(
            self.config.audio.input_device.as_deref(),
            self.config.audio.sample_rate,
            audio_tx,
        )?;

        tracing::info!(
            sample_rate = capture.sample_rate(),
            channels = capture.channels(),
            "listening"
        );

        let channels = capture.channels();
        let handle = self.start(audio_rx, channels, make_speaker);

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| Error::Audio(format!("failed to listen for shutdown signal: {e}")))?;
        tracing::info!("shutdown requested");

        // Dropping the capture stream closes the sample channel; the
        // workers drain whatever is in flight and stop
        drop(capture);
        handle.join().await;

        tracing::info!("pipeline stopped");
        Ok(())
    }

    /// Wire the workers onto an already-running sample stream
    ///
    /// Split out from `run` so the stages can be driven without an audio
    /// device.
    pub fn start<F, S>(
        self,
        audio_rx: mpsc::UnboundedReceiver<Vec<f32>>,
        channels: u16,
        make_speaker: F,
    ) -> PipelineHandle
    where
        F: FnOnce() -> Result<S> + Send + 'static,
        S: Speaker,
    {
        let frame_size = self.config.vad.frame_size(self.config.audio.sample_rate);
        let chunker = FrameChunker::new(frame_size, usize::from(channels));
        let segmenter = Segmenter::new(&self.config.vad);

        let (utterance_tx, utterance_rx) =
            mpsc::channel::<UtteranceSegment>(self.config.pipeline.utterance_queue);
        let (reply_tx, reply_rx) = mpsc::channel::<String>(self.config.pipeline.reply_queue);

        let segmenter_task = tokio::spawn(run_segmenter(
            audio_rx,
            utterance_tx,
            chunker,
            segmenter,
        ));

        let stage = TranscriptionStage {
            transcriber: self.transcriber,
            responder: self.responder,
            sources: self.sources,
            glasses: self.glasses,
            gate: self.gate,
            sample_rate: self.config.audio.sample_rate,
            semaphore: Arc::new(Semaphore::new(self.config.pipeline.max_response_tasks)),
            reply_tx,
        };
        let transcription_task = tokio::spawn(stage.run(utterance_rx));

        let speech_thread = std::thread::spawn(move || run_speech(reply_rx, make_speaker));

        PipelineHandle {
            segmenter: segmenter_task,
            transcription: transcription_task,
            speech: speech_thread,
        }
    }
}

/// Segmenter worker: re-chunk raw arrivals and delimit utterances
async fn run_segmenter(
    mut audio_rx: mpsc::UnboundedReceiver<Vec<f32>>,
    utterance_tx: mpsc::Sender<UtteranceSegment>,
    mut chunker: FrameChunker,
    mut segmenter: Segmenter,
) {
    while let Some(samples) = audio_rx.recv().await {
        for frame in chunker.push(&samples) {
            if let Some(segment) = segmenter.observe(&frame) {
                if utterance_tx.send(segment).await.is_err() {
                    return;
                }
            }
        }
    }

    // Channel closed: finish any utterance still open
    if let Some(segment) = segmenter.flush() {
        let _ = utterance_tx.send(segment).await;
    }
    tracing::debug!("segmenter stopped");
}

/// Transcription worker plus the reply-task dispatcher
struct TranscriptionStage {
    transcriber: Arc<dyn Transcriber>,
    responder: Arc<dyn Responder>,
    sources: Arc<ContextSources>,
    glasses: Arc<Mutex<GlassesController>>,
    gate: WakeGate,
    sample_rate: u32,
    semaphore: Arc<Semaphore>,
    reply_tx: mpsc::Sender<String>,
}

impl TranscriptionStage {
    async fn run(self, mut utterance_rx: mpsc::Receiver<UtteranceSegment>) {
        while let Some(segment) = utterance_rx.recv().await {
            // A failed transcription degrades to a missed utterance; the
            // user repeats themselves rather than the pipeline retrying
            let text = match self
                .transcriber
                .transcribe(segment.samples(), self.sample_rate)
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "transcription failed, utterance dropped");
                    continue;
                }
            };

            let text = text.trim().to_string();
            if text.is_empty() {
                continue;
            }

            match self.gate.route(&text) {
                None => {
                    tracing::debug!(transcript = %text, "no trigger phrase, dropped");
                }
                Some(Route::Glasses) => {
                    tracing::info!(transcript = %text, "glasses command");
                    let glasses = Arc::clone(&self.glasses);
                    tokio::task::spawn_blocking(move || {
                        let mut glasses = glasses.lock().unwrap();
                        if let Err(e) = glasses.toggle() {
                            tracing::error!(error = %e, "glasses toggle failed");
                        }
                    });
                }
                Some(Route::Chat) => {
                    tracing::info!(transcript = %text, "reply requested");

                    // Permit acquired here, not in the task, so a burst of
                    // requests backpressures transcription instead of
                    // piling up unbounded tasks
                    let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                        return;
                    };

                    let responder = Arc::clone(&self.responder);
                    let sources = Arc::clone(&self.sources);
                    let reply_tx = self.reply_tx.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        respond(&text, &sources, responder.as_ref(), &reply_tx).await;
                    });
                }
            }
        }
        tracing::debug!("transcription stage stopped");
    }
}

/// One fire-and-forget reply task
async fn respond(
    text: &str,
    sources: &ContextSources,
    responder: &dyn Responder,
    reply_tx: &mpsc::Sender<String>,
) {
    let context = sources.gather().await;
    let prompt = build_prompt(&context, text);

    match responder.respond(&prompt).await {
        Ok(reply) => {
            if reply_tx.send(reply).await.is_err() {
                tracing::warn!("speech output gone, reply dropped");
            }
        }
        Err(e) => {
            // No reply is enqueued; the request is simply lost
            tracing::error!(error = %e, "reply generation failed");
        }
    }
}

/// Speech-output worker: strictly one reply at a time, spoken to completion
fn run_speech<F, S>(mut reply_rx: mpsc::Receiver<String>, make_speaker: F)
where
    F: FnOnce() -> Result<S>,
    S: Speaker,
{
    let mut speaker = match make_speaker() {
        Ok(speaker) => speaker,
        Err(e) => {
            tracing::error!(error = %e, "speech output unavailable, replies will be discarded");
            // Keep draining so reply tasks never block on a dead queue
            while reply_rx.blocking_recv().is_some() {}
            return;
        }
    };

    while let Some(reply) = reply_rx.blocking_recv() {
        tracing::info!(reply = %reply, "speaking");
        if let Err(e) = speaker.speak(&reply) {
            tracing::error!(error = %e, "speech failed, reply skipped");
        }
    }
    tracing::debug!("speech output stopped");
}

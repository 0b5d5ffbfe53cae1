//! End-to-end pipeline integration tests
//!
//! Drives the full worker graph with scripted collaborators and raw
//! samples instead of an audio device.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use brim_assistant::config::{Config, GlassesConfig};
use brim_assistant::context::ContextSources;
use brim_assistant::glasses::GlassesController;
use brim_assistant::llm::Responder;
use brim_assistant::pipeline::Pipeline;
use brim_assistant::stt::Transcriber;
use brim_assistant::tts::Speaker;
use brim_assistant::{Error, Result};

/// Matches the default capture rate
const SAMPLE_RATE: u32 = 16_000;

/// Generate sine wave audio samples
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
fn generate_silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

/// One spoken utterance: a tone burst then enough silence to finalize it
fn utterance_samples() -> Vec<f32> {
    let mut samples = generate_sine_samples(440.0, 0.6, 0.3);
    samples.extend(generate_silence(1.3));
    samples
}

/// Feed samples in uneven chunks, the way a capture callback delivers them
fn send_in_chunks(tx: &mpsc::UnboundedSender<Vec<f32>>, samples: &[f32], chunk: usize) {
    for piece in samples.chunks(chunk) {
        tx.send(piece.to_vec()).expect("audio channel open");
    }
}

/// Transcriber that replays a script instead of calling Whisper
struct ScriptedTranscriber {
    script: Mutex<VecDeque<Result<String>>>,
    segment_lens: Mutex<Vec<usize>>,
}

impl ScriptedTranscriber {
    fn new<I>(script: I) -> Arc<Self>
    where
        I: IntoIterator<Item = Result<String>>,
    {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            segment_lens: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.segment_lens.lock().unwrap().len()
    }

    fn segment_lens(&self) -> Vec<usize> {
        self.segment_lens.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, samples: &[f32], _sample_rate: u32) -> Result<String> {
        self.segment_lens.lock().unwrap().push(samples.len());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

/// Responder with a fixed reply, counting invocations
struct CannedResponder {
    reply: String,
    calls: AtomicUsize,
}

impl CannedResponder {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Responder for CannedResponder {
    async fn respond(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

/// Responder that answers instantly unless the prompt mentions "slow"
struct SpeedResponder;

#[async_trait]
impl Responder for SpeedResponder {
    async fn respond(&self, prompt: &str) -> Result<String> {
        if prompt.contains("slow") {
            tokio::time::sleep(Duration::from_millis(400)).await;
            Ok("slow reply".to_string())
        } else {
            Ok("fast reply".to_string())
        }
    }
}

/// Responder that tracks how many calls run concurrently
struct GaugeResponder {
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl GaugeResponder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Responder for GaugeResponder {
    async fn respond(&self, _prompt: &str) -> Result<String> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok("ok".to_string())
    }
}

/// Speaker that records instead of playing audio
struct RecordingSpeaker {
    spoken: Arc<Mutex<Vec<String>>>,
}

impl Speaker for RecordingSpeaker {
    fn speak(&mut self, text: &str) -> Result<()> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

fn disabled_glasses() -> GlassesController {
    GlassesController::connect(&GlassesConfig::default())
}

#[tokio::test]
async fn test_pipeline_speaks_reply_for_chat_utterance() {
    let transcriber = ScriptedTranscriber::new([Ok("Hey chat, what time is it?".to_string())]);
    let responder = CannedResponder::new("It is noon.");
    let spoken = Arc::new(Mutex::new(Vec::new()));

    let pipeline = Pipeline::new(
        Config::default(),
        transcriber.clone(),
        responder.clone(),
        ContextSources::new(),
        disabled_glasses(),
    );

    let (audio_tx, audio_rx) = mpsc::unbounded_channel();
    let sink = Arc::clone(&spoken);
    let handle = pipeline.start(audio_rx, 1, move || -> Result<RecordingSpeaker> {
        Ok(RecordingSpeaker { spoken: sink })
    });

    send_in_chunks(&audio_tx, &utterance_samples(), 512);
    drop(audio_tx);
    handle.join().await;

    // 0.6s of tone segments as 12 speech frames plus 24 frames of
    // trailing silence, 800 samples each
    assert_eq!(transcriber.segment_lens(), vec![28_800]);
    assert_eq!(*spoken.lock().unwrap(), vec!["It is noon."]);
}

#[tokio::test]
async fn test_utterance_in_flight_at_shutdown_is_flushed() {
    let transcriber = ScriptedTranscriber::new([Ok("chat say goodnight".to_string())]);
    let responder = CannedResponder::new("Goodnight.");
    let spoken = Arc::new(Mutex::new(Vec::new()));

    let pipeline = Pipeline::new(
        Config::default(),
        transcriber.clone(),
        responder.clone(),
        ContextSources::new(),
        disabled_glasses(),
    );

    let (audio_tx, audio_rx) = mpsc::unbounded_channel();
    let sink = Arc::clone(&spoken);
    let handle = pipeline.start(audio_rx, 1, move || -> Result<RecordingSpeaker> {
        Ok(RecordingSpeaker { spoken: sink })
    });

    // Tone only, no trailing silence; closing the channel must finalize it
    send_in_chunks(&audio_tx, &generate_sine_samples(440.0, 0.6, 0.3), 512);
    drop(audio_tx);
    handle.join().await;

    // 12 speech frames, nothing more
    assert_eq!(transcriber.segment_lens(), vec![9_600]);
    assert_eq!(*spoken.lock().unwrap(), vec!["Goodnight."]);
}

#[tokio::test]
async fn test_replies_speak_in_completion_order() {
    let transcriber = ScriptedTranscriber::new([
        Ok("chat tell me something slow".to_string()),
        Ok("chat a quick one".to_string()),
    ]);
    let spoken = Arc::new(Mutex::new(Vec::new()));

    let pipeline = Pipeline::new(
        Config::default(),
        transcriber.clone(),
        Arc::new(SpeedResponder),
        ContextSources::new(),
        disabled_glasses(),
    );

    let (audio_tx, audio_rx) = mpsc::unbounded_channel();
    let sink = Arc::clone(&spoken);
    let handle = pipeline.start(audio_rx, 1, move || -> Result<RecordingSpeaker> {
        Ok(RecordingSpeaker { spoken: sink })
    });

    let mut samples = utterance_samples();
    samples.extend(utterance_samples());
    send_in_chunks(&audio_tx, &samples, 512);
    drop(audio_tx);
    handle.join().await;

    // The second request finishes first and is spoken first; replies are
    // ordered by completion, not by utterance
    assert_eq!(*spoken.lock().unwrap(), vec!["fast reply", "slow reply"]);
}

#[tokio::test]
async fn test_untriggered_and_empty_transcripts_are_dropped() {
    let transcriber = ScriptedTranscriber::new([
        Ok("   ".to_string()),
        Ok("nothing to see here".to_string()),
        Ok("okay chat hello".to_string()),
    ]);
    let responder = CannedResponder::new("Hello!");
    let spoken = Arc::new(Mutex::new(Vec::new()));

    let pipeline = Pipeline::new(
        Config::default(),
        transcriber.clone(),
        responder.clone(),
        ContextSources::new(),
        disabled_glasses(),
    );

    let (audio_tx, audio_rx) = mpsc::unbounded_channel();
    let sink = Arc::clone(&spoken);
    let handle = pipeline.start(audio_rx, 1, move || -> Result<RecordingSpeaker> {
        Ok(RecordingSpeaker { spoken: sink })
    });

    let mut samples = utterance_samples();
    samples.extend(utterance_samples());
    samples.extend(utterance_samples());
    send_in_chunks(&audio_tx, &samples, 512);
    drop(audio_tx);
    handle.join().await;

    assert_eq!(transcriber.calls(), 3);
    assert_eq!(responder.calls(), 1);
    assert_eq!(*spoken.lock().unwrap(), vec!["Hello!"]);
}

#[tokio::test]
async fn test_transcription_failure_drops_one_utterance() {
    let transcriber = ScriptedTranscriber::new([
        Err(Error::Stt("service unavailable".to_string())),
        Ok("chat still here?".to_string()),
    ]);
    let responder = CannedResponder::new("Still here.");
    let spoken = Arc::new(Mutex::new(Vec::new()));

    let pipeline = Pipeline::new(
        Config::default(),
        transcriber.clone(),
        responder.clone(),
        ContextSources::new(),
        disabled_glasses(),
    );

    let (audio_tx, audio_rx) = mpsc::unbounded_channel();
    let sink = Arc::clone(&spoken);
    let handle = pipeline.start(audio_rx, 1, move || -> Result<RecordingSpeaker> {
        Ok(RecordingSpeaker { spoken: sink })
    });

    let mut samples = utterance_samples();
    samples.extend(utterance_samples());
    send_in_chunks(&audio_tx, &samples, 512);
    drop(audio_tx);
    handle.join().await;

    assert_eq!(transcriber.calls(), 2);
    assert_eq!(*spoken.lock().unwrap(), vec!["Still here."]);
}

#[tokio::test]
async fn test_response_tasks_respect_concurrency_cap() {
    let transcriber = ScriptedTranscriber::new(
        (0..6).map(|i| Ok(format!("chat question number {i}"))),
    );
    let responder = GaugeResponder::new();
    let spoken = Arc::new(Mutex::new(Vec::new()));

    let mut config = Config::default();
    config.pipeline.max_response_tasks = 2;

    let pipeline = Pipeline::new(
        config,
        transcriber.clone(),
        responder.clone(),
        ContextSources::new(),
        disabled_glasses(),
    );

    let (audio_tx, audio_rx) = mpsc::unbounded_channel();
    let sink = Arc::clone(&spoken);
    let handle = pipeline.start(audio_rx, 1, move || -> Result<RecordingSpeaker> {
        Ok(RecordingSpeaker { spoken: sink })
    });

    let mut samples = Vec::new();
    for _ in 0..6 {
        samples.extend(utterance_samples());
    }
    send_in_chunks(&audio_tx, &samples, 512);
    drop(audio_tx);
    handle.join().await;

    assert_eq!(responder.calls.load(Ordering::SeqCst), 6);
    assert_eq!(responder.peak.load(Ordering::SeqCst), 2);
    assert_eq!(spoken.lock().unwrap().len(), 6);
}

#[tokio::test]
async fn test_glasses_route_skips_responder() {
    let transcriber = ScriptedTranscriber::new([Ok("glasses down please".to_string())]);
    let responder = CannedResponder::new("unused");
    let spoken = Arc::new(Mutex::new(Vec::new()));

    let pipeline = Pipeline::new(
        Config::default(),
        transcriber.clone(),
        responder.clone(),
        ContextSources::new(),
        disabled_glasses(),
    );

    let (audio_tx, audio_rx) = mpsc::unbounded_channel();
    let sink = Arc::clone(&spoken);
    let handle = pipeline.start(audio_rx, 1, move || -> Result<RecordingSpeaker> {
        Ok(RecordingSpeaker { spoken: sink })
    });

    send_in_chunks(&audio_tx, &utterance_samples(), 512);
    drop(audio_tx);
    handle.join().await;

    assert_eq!(transcriber.calls(), 1);
    assert_eq!(responder.calls(), 0);
    assert!(spoken.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_speaker_failure_drains_replies() {
    let transcriber = ScriptedTranscriber::new([Ok("chat anyone listening?".to_string())]);
    let responder = CannedResponder::new("Apparently not.");

    let pipeline = Pipeline::new(
        Config::default(),
        transcriber.clone(),
        responder.clone(),
        ContextSources::new(),
        disabled_glasses(),
    );

    let (audio_tx, audio_rx) = mpsc::unbounded_channel();
    let handle = pipeline.start(audio_rx, 1, || -> Result<RecordingSpeaker> {
        Err(Error::Tts("no output device".to_string()))
    });

    send_in_chunks(&audio_tx, &utterance_samples(), 512);
    drop(audio_tx);

    // Must not hang: the dead speech stage keeps draining the reply queue
    handle.join().await;

    assert_eq!(responder.calls(), 1);
}

//! Brim - Voice assistant pipeline for a wearable hat
//!
//! This library provides the core functionality for the brim assistant:
//! - Continuous microphone capture and RMS-based utterance segmentation
//! - Whisper transcription and trigger-phrase routing
//! - Situational context from a serial camera and Google Calendar
//! - Chat completions spoken back through OpenAI TTS
//! - A serial-servo actuator that raises and lowers the glasses
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Microphone                         │
//! │        capture  │  framing  │  segmentation         │
//! └────────────────────┬────────────────────────────────┘
//!                      │ utterances (bounded queue)
//! ┌────────────────────▼────────────────────────────────┐
//! │              Transcription + Routing                │
//! │   Whisper STT  │  trigger gate  │  glasses servo    │
//! └────────────────────┬────────────────────────────────┘
//!                      │ chat requests (task per reply)
//! ┌────────────────────▼────────────────────────────────┐
//! │                Response Tasks                       │
//! │   camera + calendar context  │  chat completion     │
//! └────────────────────┬────────────────────────────────┘
//!                      │ replies (bounded queue)
//! ┌────────────────────▼────────────────────────────────┐
//! │                Speech Output                        │
//! │          TTS synthesis  │  playback (FIFO)          │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod context;
pub mod error;
pub mod glasses;
pub mod llm;
pub mod pipeline;
pub mod stt;
pub mod tts;
pub mod vad;
pub mod wake;

pub use audio::{AudioCapture, AudioFrame, AudioPlayback, FrameChunker, samples_to_wav};
pub use config::Config;
pub use context::{CalendarClient, ContextSources, SightSource, SituationalContext};
pub use error::{Error, Result};
pub use glasses::GlassesController;
pub use llm::{ChatClient, Responder, build_prompt};
pub use pipeline::{Pipeline, PipelineHandle};
pub use stt::{Transcriber, WhisperClient};
pub use tts::{Speaker, TextToSpeech};
pub use vad::{Segmenter, SpeechState, UtteranceSegment, rms};
pub use wake::{Route, WakeGate};

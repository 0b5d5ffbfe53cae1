//! Voice-activity segmentation
//!
//! Classifies analysis frames as speech or silence by RMS energy and groups
//! runs of speech into complete utterance segments. Silence inside a run is
//! retained, so a finished segment carries its trailing pause; a run whose
//! speech content is too short is dropped whole.

use crate::audio::AudioFrame;
use crate::config::VadConfig;

/// State of the segmenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechState {
    /// Waiting for speech
    Idle,
    /// Accumulating an utterance
    Speaking,
}

/// One delimited utterance: concatenated mono samples including the
/// retained trailing pause
#[derive(Debug, Clone, PartialEq)]
pub struct UtteranceSegment {
    samples: Vec<f32>,
}

impl UtteranceSegment {
    /// Borrow the samples
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Consume into the sample buffer
    #[must_use]
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Sample count
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the segment holds no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Groups speech frames into utterance segments
pub struct Segmenter {
    threshold: f32,
    silence_frame_limit: usize,
    min_speech_frames: usize,
    state: SpeechState,
    buffer: Vec<f32>,
    /// Speech-classified frames in the current run; silence appended to the
    /// buffer does not count toward the minimum-duration check
    speech_frames: usize,
    silence_run: usize,
}

impl Segmenter {
    /// Create a segmenter from VAD thresholds
    #[must_use]
    pub fn new(config: &VadConfig) -> Self {
        let silence_frame_limit = config.silence_frame_limit();
        let min_speech_frames = config.min_speech_frames();

        tracing::debug!(
            threshold = config.silence_threshold,
            silence_frame_limit,
            min_speech_frames,
            "segmenter initialized"
        );

        Self {
            threshold: config.silence_threshold,
            silence_frame_limit,
            min_speech_frames,
            state: SpeechState::Idle,
            buffer: Vec::new(),
            speech_frames: 0,
            silence_run: 0,
        }
    }

    /// Feed one analysis frame
    ///
    /// Returns a finished segment when this frame completes the trailing
    /// silence timeout of a sufficiently long speech run.
    pub fn observe(&mut self, frame: &AudioFrame) -> Option<UtteranceSegment> {
        let is_speech = rms(&frame.samples) > self.threshold;

        match self.state {
            SpeechState::Idle => {
                if is_speech {
                    self.state = SpeechState::Speaking;
                    self.buffer.extend_from_slice(&frame.samples);
                    self.speech_frames = 1;
                    self.silence_run = 0;
                    tracing::debug!(seq = frame.seq, "speech started");
                }
                None
            }
            SpeechState::Speaking => {
                self.buffer.extend_from_slice(&frame.samples);

                if is_speech {
                    self.speech_frames += 1;
                    self.silence_run = 0;
                    None
                } else {
                    self.silence_run += 1;
                    if self.silence_run >= self.silence_frame_limit {
                        self.finalize()
                    } else {
                        None
                    }
                }
            }
        }
    }

    /// Finalize an in-progress utterance without waiting for the timeout
    ///
    /// Intended for shutdown; the usual too-short check still applies.
    pub fn flush(&mut self) -> Option<UtteranceSegment> {
        if self.state == SpeechState::Speaking {
            self.finalize()
        } else {
            None
        }
    }

    /// Current machine state
    #[must_use]
    pub const fn state(&self) -> SpeechState {
        self.state
    }

    fn finalize(&mut self) -> Option<UtteranceSegment> {
        let kept = self.speech_frames >= self.min_speech_frames;
        let samples = std::mem::take(&mut self.buffer);

        if kept {
            tracing::debug!(
                samples = samples.len(),
                speech_frames = self.speech_frames,
                "utterance complete"
            );
        } else {
            tracing::debug!(
                speech_frames = self.speech_frames,
                min = self.min_speech_frames,
                "speech run too short, dropped"
            );
        }

        self.state = SpeechState::Idle;
        self.speech_frames = 0;
        self.silence_run = 0;

        kept.then_some(UtteranceSegment { samples })
    }
}

/// RMS amplitude of a frame
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

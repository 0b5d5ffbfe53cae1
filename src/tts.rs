//! Text-to-speech synthesis
//!
//! Runs on the dedicated speech-output thread with a blocking HTTP client;
//! `speak` returns only after playback has finished, which is what keeps
//! queued replies from talking over each other.

use crate::audio::AudioPlayback;
use crate::{Error, Result};

/// Speaks one reply aloud, blocking until playback completes
pub trait Speaker {
    /// Synthesize and play the reply to completion
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails
    fn speak(&mut self, text: &str) -> Result<()>;
}

#[derive(serde::Serialize)]
struct TtsRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
}

/// Synthesizes speech with the OpenAI audio API and plays it locally
pub struct TextToSpeech {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    voice: String,
    speed: f32,
    playback: AudioPlayback,
}

impl TextToSpeech {
    /// Create a new TTS instance with its own output device handle
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing or no output device is
    /// available
    pub fn new(api_key: String, model: String, voice: String, speed: f32) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::blocking::Client::new(),
            api_key,
            model,
            voice,
            speed,
            playback: AudioPlayback::new()?,
        })
    }

    fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::error!(status = %status, body = %body, "TTS API error");
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes()?;
        Ok(audio.to_vec())
    }
}

impl Speaker for TextToSpeech {
    fn speak(&mut self, text: &str) -> Result<()> {
        tracing::debug!(chars = text.len(), "synthesizing speech");

        let audio = self.synthesize(text)?;
        tracing::debug!(audio_bytes = audio.len(), "playing reply");
        self.playback.play_mp3(&audio)
    }
}

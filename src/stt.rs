//! Speech-to-text transcription

use async_trait::async_trait;

use crate::audio::samples_to_wav;
use crate::{Error, Result};

/// Response from the OpenAI transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Turns recorded speech into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe mono samples at the given rate to text
    async fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<String>;
}

/// Transcribes speech using OpenAI Whisper
pub struct WhisperClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    language: String,
}

impl WhisperClient {
    /// Create a new Whisper client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String, model: String, language: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            language,
        })
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<String> {
        let wav = samples_to_wav(samples, sample_rate)?;
        tracing::debug!(
            samples = samples.len(),
            wav_bytes = wav.len(),
            "starting Whisper transcription"
        );

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("language", self.language.clone());

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            e
        })?;

        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }
}

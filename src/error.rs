//! Error types for the brim assistant

use thiserror::Error;

/// Result type alias for brim operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the brim assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Language-model error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Vision API error
    #[error("vision error: {0}")]
    Vision(String),

    /// Camera link error
    #[error("camera error: {0}")]
    Camera(String),

    /// Calendar lookup error
    #[error("calendar error: {0}")]
    Calendar(String),

    /// Glasses servo error
    #[error("glasses error: {0}")]
    Glasses(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WAV encoding error
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}

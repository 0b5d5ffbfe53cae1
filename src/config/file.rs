//! TOML configuration file loading
//!
//! Supports `~/.config/brim/config.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct BrimConfigFile {
    /// Audio capture configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Voice-activity detection thresholds
    #[serde(default)]
    pub vad: VadFileConfig,

    /// Wake-phrase trigger lists
    #[serde(default)]
    pub triggers: TriggerFileConfig,

    /// OpenAI model configuration
    #[serde(default)]
    pub openai: OpenAiFileConfig,

    /// Camera + vision configuration
    #[serde(default)]
    pub vision: VisionFileConfig,

    /// Calendar lookup configuration
    #[serde(default)]
    pub calendar: CalendarFileConfig,

    /// Glasses servo configuration
    #[serde(default)]
    pub glasses: GlassesFileConfig,

    /// Queue and task limits
    #[serde(default)]
    pub pipeline: PipelineFileConfig,
}

/// Audio capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Substring matched against input device names (e.g. "USB")
    pub input_device: Option<String>,

    /// Capture sample rate in Hz
    pub sample_rate: Option<u32>,
}

/// Voice-activity detection thresholds
#[derive(Debug, Default, Deserialize)]
pub struct VadFileConfig {
    /// RMS amplitude above which a frame counts as speech
    pub silence_threshold: Option<f32>,

    /// Trailing silence (seconds) that finalizes an utterance
    pub silence_duration: Option<f32>,

    /// Minimum speech (seconds) for a segment to be kept
    pub min_speech_duration: Option<f32>,

    /// Analysis frame length in seconds
    pub frame_duration: Option<f32>,
}

/// Wake-phrase trigger lists (lower-case substrings)
#[derive(Debug, Default, Deserialize)]
pub struct TriggerFileConfig {
    /// Phrases that toggle the glasses
    pub glasses: Option<Vec<String>>,

    /// Phrases that route to the chat responder
    pub chat: Option<Vec<String>>,
}

/// OpenAI model configuration
#[derive(Debug, Default, Deserialize)]
pub struct OpenAiFileConfig {
    /// API key (env `OPENAI_API_KEY` takes precedence)
    pub api_key: Option<String>,

    /// Transcription model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// Transcription language hint (e.g. "en")
    pub stt_language: Option<String>,

    /// Chat completion model
    pub llm_model: Option<String>,

    /// Speech synthesis model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// Speech synthesis voice (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// Speech speed multiplier
    pub tts_speed: Option<f32>,
}

/// Camera + vision configuration
#[derive(Debug, Default, Deserialize)]
pub struct VisionFileConfig {
    /// Enable the sight context source
    pub enabled: Option<bool>,

    /// Serial port for the camera link
    pub camera_port: Option<String>,

    /// Serial baud rate
    pub baud_rate: Option<u32>,

    /// Anthropic API key (env `ANTHROPIC_API_KEY` takes precedence)
    pub api_key: Option<String>,

    /// Vision model identifier
    pub model: Option<String>,

    /// Max object labels per frame
    pub max_labels: Option<usize>,
}

/// Calendar lookup configuration
#[derive(Debug, Default, Deserialize)]
pub struct CalendarFileConfig {
    /// Enable the calendar context source
    pub enabled: Option<bool>,

    /// Path to the Google service account JSON file
    pub service_account: Option<String>,

    /// Max upcoming events to include
    pub max_events: Option<usize>,
}

/// Glasses servo configuration
#[derive(Debug, Default, Deserialize)]
pub struct GlassesFileConfig {
    /// Enable the glasses actuator
    pub enabled: Option<bool>,

    /// Serial port for the servo link
    pub port: Option<String>,

    /// Serial baud rate
    pub baud_rate: Option<u32>,

    /// Servo angle for glasses up
    pub up_angle: Option<u8>,

    /// Servo angle for glasses down
    pub down_angle: Option<u8>,

    /// Servo angle applied at startup
    pub initial_angle: Option<u8>,
}

/// Queue and task limits
#[derive(Debug, Default, Deserialize)]
pub struct PipelineFileConfig {
    /// Utterance queue capacity
    pub utterance_queue: Option<usize>,

    /// Reply queue capacity
    pub reply_queue: Option<usize>,

    /// Max concurrent response tasks
    pub max_response_tasks: Option<usize>,
}

/// Load the TOML config file from the standard path
///
/// Returns `BrimConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> BrimConfigFile {
    let Some(path) = config_file_path() else {
        return BrimConfigFile::default();
    };

    if !path.exists() {
        return BrimConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                BrimConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            BrimConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/brim/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("brim").join("config.toml"))
}

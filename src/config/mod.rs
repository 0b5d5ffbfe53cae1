//! Configuration for the brim assistant
//!
//! Layered: built-in defaults, then the optional TOML file
//! (`~/.config/brim/config.toml`), then environment variables.
//! All values are fixed for the lifetime of a run.

pub mod file;

use std::path::PathBuf;

/// Assistant configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Audio capture settings
    pub audio: AudioConfig,

    /// Voice-activity detection thresholds
    pub vad: VadConfig,

    /// Wake-phrase trigger lists
    pub triggers: TriggerConfig,

    /// OpenAI collaborator settings (STT, LLM, TTS)
    pub openai: OpenAiConfig,

    /// Camera + vision context source
    pub vision: VisionConfig,

    /// Calendar context source
    pub calendar: CalendarConfig,

    /// Glasses servo actuator
    pub glasses: GlassesConfig,

    /// Queue capacities and task limits
    pub pipeline: PipelineConfig,
}

/// Audio capture settings
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Substring matched (case-insensitive) against input device names;
    /// `None` uses the system default device
    pub input_device: Option<String>,

    /// Capture sample rate in Hz
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: Some("USB".to_string()),
            sample_rate: 16_000,
        }
    }
}

/// Voice-activity detection thresholds
#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    /// RMS amplitude above which a frame counts as speech
    pub silence_threshold: f32,

    /// Trailing silence (seconds) that finalizes an utterance
    pub silence_duration: f32,

    /// Minimum accumulated speech (seconds) for a segment to be kept
    pub min_speech_duration: f32,

    /// Analysis frame length in seconds
    pub frame_duration: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 0.01,
            silence_duration: 1.2,
            min_speech_duration: 0.5,
            frame_duration: 0.05,
        }
    }
}

impl VadConfig {
    /// Number of consecutive silence frames that finalizes an utterance
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn silence_frame_limit(&self) -> usize {
        (self.silence_duration / self.frame_duration).ceil() as usize
    }

    /// Minimum speech-classified frames for a segment to be kept
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn min_speech_frames(&self) -> usize {
        (self.min_speech_duration / self.frame_duration).ceil() as usize
    }

    /// Samples per analysis frame at the given capture rate
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn frame_size(&self, sample_rate: u32) -> usize {
        (sample_rate as f32 * self.frame_duration).round() as usize
    }
}

/// Wake-phrase trigger lists, checked in priority order:
/// glasses first, then chat
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    /// Phrases that toggle the glasses (lower-case substrings)
    pub glasses: Vec<String>,

    /// Phrases that route to the chat responder (lower-case substrings)
    pub chat: Vec<String>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            glasses: vec!["glasses".into(), "classes".into()],
            chat: vec![
                "chat".into(),
                "chet".into(),
                " hat ".into(),
                " hat.".into(),
                " hat,".into(),
                " het".into(),
                " het.".into(),
                "-hat".into(),
            ],
        }
    }
}

/// OpenAI collaborator settings
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key (from `OPENAI_API_KEY` or the config file)
    pub api_key: Option<String>,

    /// Transcription model
    pub stt_model: String,

    /// Transcription language hint
    pub stt_language: String,

    /// Chat completion model
    pub llm_model: String,

    /// Speech synthesis model
    pub tts_model: String,

    /// Speech synthesis voice
    pub tts_voice: String,

    /// Speech speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            stt_model: "whisper-1".to_string(),
            stt_language: "en".to_string(),
            llm_model: "gpt-4o-mini".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_speed: 1.0,
        }
    }
}

/// Camera + vision context source
#[derive(Debug, Clone)]
pub struct VisionConfig {
    /// Enable the sight context source
    pub enabled: bool,

    /// Serial port for the camera link (e.g. "/dev/ttyUSB0")
    pub camera_port: Option<String>,

    /// Serial baud rate
    pub baud_rate: u32,

    /// Anthropic API key (from `ANTHROPIC_API_KEY` or the config file)
    pub api_key: Option<String>,

    /// Vision model identifier
    pub model: String,

    /// Max object labels per frame
    pub max_labels: usize,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            camera_port: None,
            baud_rate: 2_000_000,
            api_key: None,
            model: "claude-sonnet-4-20250514".to_string(),
            max_labels: 3,
        }
    }
}

/// Calendar context source
#[derive(Debug, Clone)]
pub struct CalendarConfig {
    /// Enable the calendar context source
    pub enabled: bool,

    /// Path to the Google service account JSON file
    pub service_account: Option<PathBuf>,

    /// Max upcoming events to include
    pub max_events: usize,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_account: None,
            max_events: 3,
        }
    }
}

/// Glasses servo actuator
#[derive(Debug, Clone)]
pub struct GlassesConfig {
    /// Enable the glasses actuator
    pub enabled: bool,

    /// Serial port for the servo link (e.g. "/dev/ttyUSB1")
    pub port: Option<String>,

    /// Serial baud rate
    pub baud_rate: u32,

    /// Servo angle for glasses up
    pub up_angle: u8,

    /// Servo angle for glasses down
    pub down_angle: u8,

    /// Servo angle applied at startup
    pub initial_angle: u8,
}

impl Default for GlassesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: None,
            baud_rate: 2_000_000,
            up_angle: 0,
            down_angle: 90,
            initial_angle: 20,
        }
    }
}

/// Queue capacities and task limits
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Utterance queue capacity (segmenter → transcription)
    pub utterance_queue: usize,

    /// Reply queue capacity (response tasks → speech output)
    pub reply_queue: usize,

    /// Max concurrent response tasks
    pub max_response_tasks: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            utterance_queue: 32,
            reply_queue: 16,
            max_response_tasks: 4,
        }
    }
}

impl Config {
    /// Load configuration: env > config file > defaults
    #[must_use]
    pub fn load() -> Self {
        let fc = file::load_config_file();
        let defaults = Self::default();

        let audio = AudioConfig {
            input_device: std::env::var("BRIM_INPUT_DEVICE")
                .ok()
                .or(fc.audio.input_device)
                .or(defaults.audio.input_device),
            sample_rate: fc.audio.sample_rate.unwrap_or(defaults.audio.sample_rate),
        };

        let vad = VadConfig {
            silence_threshold: fc
                .vad
                .silence_threshold
                .unwrap_or(defaults.vad.silence_threshold),
            silence_duration: fc
                .vad
                .silence_duration
                .unwrap_or(defaults.vad.silence_duration),
            min_speech_duration: fc
                .vad
                .min_speech_duration
                .unwrap_or(defaults.vad.min_speech_duration),
            frame_duration: fc
                .vad
                .frame_duration
                .unwrap_or(defaults.vad.frame_duration),
        };

        let triggers = TriggerConfig {
            glasses: fc.triggers.glasses.unwrap_or(defaults.triggers.glasses),
            chat: fc.triggers.chat.unwrap_or(defaults.triggers.chat),
        };

        let openai = OpenAiConfig {
            api_key: std::env::var("OPENAI_API_KEY").ok().or(fc.openai.api_key),
            stt_model: std::env::var("BRIM_STT_MODEL")
                .ok()
                .or(fc.openai.stt_model)
                .unwrap_or(defaults.openai.stt_model),
            stt_language: fc
                .openai
                .stt_language
                .unwrap_or(defaults.openai.stt_language),
            llm_model: std::env::var("BRIM_LLM_MODEL")
                .ok()
                .or(fc.openai.llm_model)
                .unwrap_or(defaults.openai.llm_model),
            tts_model: std::env::var("BRIM_TTS_MODEL")
                .ok()
                .or(fc.openai.tts_model)
                .unwrap_or(defaults.openai.tts_model),
            tts_voice: std::env::var("BRIM_TTS_VOICE")
                .ok()
                .or(fc.openai.tts_voice)
                .unwrap_or(defaults.openai.tts_voice),
            tts_speed: fc.openai.tts_speed.unwrap_or(defaults.openai.tts_speed),
        };

        let vision = VisionConfig {
            enabled: fc.vision.enabled.unwrap_or(defaults.vision.enabled),
            camera_port: std::env::var("BRIM_CAMERA_PORT")
                .ok()
                .or(fc.vision.camera_port),
            baud_rate: fc.vision.baud_rate.unwrap_or(defaults.vision.baud_rate),
            api_key: std::env::var("ANTHROPIC_API_KEY").ok().or(fc.vision.api_key),
            model: fc.vision.model.unwrap_or(defaults.vision.model),
            max_labels: fc.vision.max_labels.unwrap_or(defaults.vision.max_labels),
        };

        let calendar = CalendarConfig {
            enabled: fc.calendar.enabled.unwrap_or(defaults.calendar.enabled),
            service_account: std::env::var("GOOGLE_SERVICE_ACCOUNT")
                .ok()
                .map(PathBuf::from)
                .or(fc.calendar.service_account.map(PathBuf::from)),
            max_events: fc
                .calendar
                .max_events
                .unwrap_or(defaults.calendar.max_events),
        };

        let glasses = GlassesConfig {
            enabled: fc.glasses.enabled.unwrap_or(defaults.glasses.enabled),
            port: std::env::var("BRIM_GLASSES_PORT").ok().or(fc.glasses.port),
            baud_rate: fc.glasses.baud_rate.unwrap_or(defaults.glasses.baud_rate),
            up_angle: fc.glasses.up_angle.unwrap_or(defaults.glasses.up_angle),
            down_angle: fc.glasses.down_angle.unwrap_or(defaults.glasses.down_angle),
            initial_angle: fc
                .glasses
                .initial_angle
                .unwrap_or(defaults.glasses.initial_angle),
        };

        let pipeline = PipelineConfig {
            utterance_queue: fc
                .pipeline
                .utterance_queue
                .unwrap_or(defaults.pipeline.utterance_queue),
            reply_queue: fc
                .pipeline
                .reply_queue
                .unwrap_or(defaults.pipeline.reply_queue),
            max_response_tasks: fc
                .pipeline
                .max_response_tasks
                .unwrap_or(defaults.pipeline.max_response_tasks),
        };

        Self {
            audio,
            vad,
            triggers,
            openai,
            vision,
            calendar,
            glasses,
            pipeline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_frame_counts() {
        let vad = VadConfig::default();
        assert_eq!(vad.silence_frame_limit(), 24);
        assert_eq!(vad.min_speech_frames(), 10);
        assert_eq!(vad.frame_size(16_000), 800);
    }

    #[test]
    fn frame_counts_round_up() {
        let vad = VadConfig {
            silence_duration: 1.25,
            min_speech_duration: 0.51,
            frame_duration: 0.1,
            ..VadConfig::default()
        };
        assert_eq!(vad.silence_frame_limit(), 13);
        assert_eq!(vad.min_speech_frames(), 6);
    }

    #[test]
    fn default_triggers_present() {
        let triggers = TriggerConfig::default();
        assert!(triggers.glasses.contains(&"glasses".to_string()));
        assert!(triggers.chat.contains(&"chat".to_string()));
        assert!(triggers.chat.iter().any(|t| t.contains("hat")));
    }
}

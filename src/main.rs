use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use brim_assistant::audio::{AudioCapture, AudioPlayback};
use brim_assistant::context::{CalendarClient, ContextSources, SightSource};
use brim_assistant::glasses::GlassesController;
use brim_assistant::llm::ChatClient;
use brim_assistant::stt::WhisperClient;
use brim_assistant::tts::{Speaker, TextToSpeech};
use brim_assistant::vad::rms;
use brim_assistant::{Config, Pipeline};

/// Brim - Voice assistant that lives in a hat
#[derive(Parser)]
#[command(name = "brim", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Grab one camera frame and print the detected objects
    TestCamera,
    /// Drive the glasses servo (toggles when no angle is given)
    Glasses {
        /// Servo angle in degrees (0-180)
        #[arg(short, long)]
        angle: Option<u8>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,brim_assistant=info",
        1 => "info,brim_assistant=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    // Handle subcommands
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(text).await,
            Command::TestCamera => test_camera().await,
            Command::Glasses { angle } => cmd_glasses(angle).await,
        };
    }

    run_pipeline().await
}

/// Run the full assistant pipeline until interrupted
#[allow(clippy::future_not_send)]
async fn run_pipeline() -> anyhow::Result<()> {
    let config = Config::load();

    tracing::info!(
        device = ?config.audio.input_device,
        sample_rate = config.audio.sample_rate,
        vision = config.vision.enabled,
        calendar = config.calendar.enabled,
        glasses = config.glasses.enabled,
        "starting brim"
    );

    let Some(api_key) = config.openai.api_key.clone() else {
        anyhow::bail!("OPENAI_API_KEY is required (environment or config file)");
    };

    let transcriber = Arc::new(WhisperClient::new(
        api_key.clone(),
        config.openai.stt_model.clone(),
        config.openai.stt_language.clone(),
    )?);
    let responder = Arc::new(ChatClient::new(
        api_key.clone(),
        config.openai.llm_model.clone(),
    )?);

    // Serial boards reset on open and settle for a couple of seconds
    let hw_config = config.clone();
    let (sources, glasses) =
        tokio::task::spawn_blocking(move || build_hardware(&hw_config)).await?;

    let tts_model = config.openai.tts_model.clone();
    let tts_voice = config.openai.tts_voice.clone();
    let tts_speed = config.openai.tts_speed;
    let make_speaker = move || TextToSpeech::new(api_key, tts_model, tts_voice, tts_speed);

    let pipeline = Pipeline::new(config, transcriber, responder, sources, glasses);

    tracing::info!("brim ready - say \"chat\" or \"glasses\"");

    pipeline.run(make_speaker).await?;

    Ok(())
}

/// Open the serial-attached context sources and the glasses servo.
///
/// Every failure here degrades: the assistant still answers, it just
/// cannot see, recall the calendar, or move the glasses.
fn build_hardware(config: &Config) -> (ContextSources, GlassesController) {
    let mut sources = ContextSources::new();

    if config.vision.enabled {
        match (&config.vision.camera_port, &config.vision.api_key) {
            (Some(port), Some(key)) => {
                match SightSource::open(
                    port,
                    config.vision.baud_rate,
                    key.clone(),
                    config.vision.model.clone(),
                    config.vision.max_labels,
                ) {
                    Ok(sight) => sources = sources.with_sight(sight),
                    Err(e) => tracing::warn!(error = %e, "camera unavailable"),
                }
            }
            _ => tracing::warn!("vision enabled but camera port or ANTHROPIC_API_KEY missing"),
        }
    }

    if config.calendar.enabled {
        if let Some(path) = &config.calendar.service_account {
            sources =
                sources.with_calendar(CalendarClient::new(path.clone(), config.calendar.max_events));
        } else {
            tracing::warn!("calendar enabled but no service account configured");
        }
    }

    let glasses = GlassesController::connect(&config.glasses);

    (sources, glasses)
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let config = Config::load();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let capture = AudioCapture::start(
        config.audio.input_device.as_deref(),
        config.audio.sample_rate,
        tx,
    )?;

    println!("Sample rate: {} Hz", capture.sample_rate());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Drain the last second of audio
        let mut samples = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            samples.extend(chunk);
        }

        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    drop(capture);

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");
    println!("  4. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    // Generate 2 seconds of 440Hz sine wave at 24kHz sample rate
    let sample_rate = 24000_i32;
    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (sample_rate as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    tokio::task::spawn_blocking(move || -> brim_assistant::Result<()> {
        let playback = AudioPlayback::new()?;
        playback.play(samples)
    })
    .await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Test TTS output
async fn test_tts(text: String) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load();
    let Some(api_key) = config.openai.api_key else {
        anyhow::bail!("OPENAI_API_KEY is required for TTS");
    };

    println!("Synthesizing speech...");
    tokio::task::spawn_blocking(move || -> brim_assistant::Result<()> {
        let mut speaker = TextToSpeech::new(
            api_key,
            config.openai.tts_model,
            config.openai.tts_voice,
            config.openai.tts_speed,
        )?;
        speaker.speak(&text)
    })
    .await??;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

/// Grab one camera frame and print the detected objects
async fn test_camera() -> anyhow::Result<()> {
    let config = Config::load();
    let vision = config.vision;

    let Some(port) = vision.camera_port else {
        anyhow::bail!("no camera port configured (set BRIM_CAMERA_PORT or vision.camera_port)");
    };
    let Some(api_key) = vision.api_key else {
        anyhow::bail!("no vision API key configured (set ANTHROPIC_API_KEY)");
    };

    println!("Opening camera on {port} (the board takes a moment to settle)...");
    let sight = tokio::task::spawn_blocking(move || {
        SightSource::open(&port, vision.baud_rate, api_key, vision.model, vision.max_labels)
    })
    .await??;

    println!("Grabbing a frame...");
    let jpeg = sight.capture_frame().await?;
    println!("Captured JPEG frame: {} bytes", jpeg.len());

    println!("Labeling it...");
    let labels = sight.label_frame(&jpeg).await?;

    if labels.is_empty() {
        println!("No objects detected");
    } else {
        println!("Detected: {}", labels.join(", "));
    }

    Ok(())
}

/// Drive the glasses servo from the command line
async fn cmd_glasses(angle: Option<u8>) -> anyhow::Result<()> {
    let config = Config::load();

    if !config.glasses.enabled || config.glasses.port.is_none() {
        anyhow::bail!("glasses not configured (set glasses.enabled and glasses.port)");
    }

    let moved = tokio::task::spawn_blocking(move || -> brim_assistant::Result<bool> {
        let mut controller = GlassesController::connect(&config.glasses);
        match angle {
            Some(a) => controller.set_angle(a),
            None => controller.toggle(),
        }
    })
    .await??;

    if moved {
        match angle {
            Some(a) => println!("Servo moved to {a} degrees"),
            None => println!("Glasses toggled"),
        }
    } else {
        println!("Servo did not acknowledge (is the board connected?)");
    }

    Ok(())
}

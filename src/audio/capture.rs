//! Audio capture from microphone
//!
//! Opens a cpal input stream and forwards captured blocks into an unbounded
//! channel. The device callback only converts the block and sends; it never
//! blocks on downstream work.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, SupportedStreamConfig};
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Captures audio from an input device
///
/// cpal streams aren't `Send`; keep this on the thread that created it.
/// Capture stops when the instance is dropped.
pub struct AudioCapture {
    #[allow(dead_code)]
    stream: Stream,
    channels: u16,
    sample_rate: u32,
}

impl AudioCapture {
    /// Open an input device and start forwarding captured blocks
    ///
    /// Prefers the first input device whose name contains `device_hint`
    /// (case-insensitive), falling back to the system default. Block sizes
    /// follow the device's own buffering, not the analysis frame size.
    ///
    /// # Errors
    ///
    /// Returns error if no input device is available, no device config
    /// supports `sample_rate`, or the stream cannot be started
    pub fn start(
        device_hint: Option<&str>,
        sample_rate: u32,
        tx: mpsc::UnboundedSender<Vec<f32>>,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let device = find_input_device(&host, device_hint)?;
        let supported = find_supported_config(&device, sample_rate)?;

        let sample_format = supported.sample_format();
        let config = supported.config();
        let channels = config.channels;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels,
            format = ?sample_format,
            "audio capture initialized"
        );

        let stream = match sample_format {
            cpal::SampleFormat::F32 => {
                let tx = tx.clone();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let _ = tx.send(data.to_vec());
                    },
                    log_stream_error,
                    None,
                )
            }
            cpal::SampleFormat::I16 => {
                let tx = tx.clone();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let block = data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                        let _ = tx.send(block);
                    },
                    log_stream_error,
                    None,
                )
            }
            cpal::SampleFormat::U16 => {
                let tx = tx.clone();
                device.build_input_stream(
                    &config,
                    move |data: &[u16], _: &cpal::InputCallbackInfo| {
                        let block = data
                            .iter()
                            .map(|&s| f32::from(s) / f32::from(u16::MAX) * 2.0 - 1.0)
                            .collect();
                        let _ = tx.send(block);
                    },
                    log_stream_error,
                    None,
                )
            }
            other => {
                return Err(Error::Audio(format!("unsupported sample format: {other}")));
            }
        }
        .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        tracing::debug!("audio capture started");

        Ok(Self {
            stream,
            channels,
            sample_rate,
        })
    }

    /// Channel count of the opened device config
    #[must_use]
    pub const fn channels(&self) -> u16 {
        self.channels
    }

    /// Capture sample rate in Hz
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

fn log_stream_error(err: cpal::StreamError) {
    tracing::error!(error = %err, "audio capture error");
}

/// Find an input device by name substring, falling back to the default
fn find_input_device(host: &cpal::Host, hint: Option<&str>) -> Result<Device> {
    if let Some(hint) = hint {
        let needle = hint.to_lowercase();
        let devices = host
            .input_devices()
            .map_err(|e| Error::Audio(e.to_string()))?;
        for device in devices {
            if device
                .name()
                .is_ok_and(|name| name.to_lowercase().contains(&needle))
            {
                tracing::info!(
                    device = device.name().unwrap_or_default(),
                    "matched input device"
                );
                return Ok(device);
            }
        }
        tracing::warn!(hint, "no input device matched, using default");
    }

    host.default_input_device()
        .ok_or_else(|| Error::Audio("no input device available".to_string()))
}

/// Find a device config at the requested rate, preferring mono
///
/// Multi-channel configs are accepted; the chunker collapses them to mono.
fn find_supported_config(device: &Device, sample_rate: u32) -> Result<SupportedStreamConfig> {
    let rate = SampleRate(sample_rate);

    let range = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| c.channels() == 1 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
        .or_else(|| {
            device
                .supported_input_configs()
                .ok()?
                .find(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
        })
        .ok_or_else(|| Error::Audio(format!("no input config supports {sample_rate} Hz")))?;

    Ok(range.with_sample_rate(rate))
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(sample_i16)?;
        }

        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

//! Camera-backed sight
//!
//! Grabs one JPEG frame from the camera module over serial and asks a
//! vision model to name the objects in it. The camera streams frames
//! continuously, so each grab first drains the stale backlog and then
//! syncs to the next frame marker.

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Frame marker preceding each length-prefixed JPEG
const FRAME_MARKER: [u8; 2] = [0xFF, 0xAA];

/// Reject lengths past this as line corruption before allocating
const MAX_FRAME_BYTES: u32 = 8 * 1024 * 1024;

const LABEL_PROMPT: &str = "List the main physical objects you can identify in this image. \
     Reply with only a comma-separated list of short singular noun labels, nothing else.";

/// Observes the surroundings through the hat camera
pub struct SightSource {
    port: Arc<Mutex<Box<dyn serialport::SerialPort>>>,
    labeler: ImageLabeler,
}

impl SightSource {
    /// Open the camera serial port and build the labeling client
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be opened or the API key is
    /// missing
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        api_key: String,
        model: String,
        max_labels: usize,
    ) -> Result<Self> {
        let mut port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_secs(1))
            .open()
            .map_err(|e| Error::Camera(format!("failed to open camera port {port_name}: {e}")))?;

        // Held low so opening the port does not reset the camera board
        let _ = port.write_data_terminal_ready(false);
        let _ = port.write_request_to_send(false);
        std::thread::sleep(Duration::from_secs(2));

        tracing::info!(port = %port_name, baud_rate, "camera port open");

        Ok(Self {
            port: Arc::new(Mutex::new(port)),
            labeler: ImageLabeler::new(api_key, model, max_labels)?,
        })
    }

    /// Grab one JPEG frame off the serial link
    ///
    /// The port lock serializes grabs from concurrent reply tasks; the
    /// camera delivers one coherent frame at a time.
    ///
    /// # Errors
    ///
    /// Returns error if the grab times out or the framing is corrupt
    pub async fn capture_frame(&self) -> Result<Vec<u8>> {
        let port = Arc::clone(&self.port);
        let jpeg = tokio::task::spawn_blocking(move || {
            let mut port = port.lock().unwrap();
            grab_frame(port.as_mut())
        })
        .await
        .map_err(|e| Error::Camera(format!("frame grab task failed: {e}")))??;

        tracing::debug!(jpeg_bytes = jpeg.len(), "frame captured");
        Ok(jpeg)
    }

    /// Name the objects in an already-captured JPEG frame
    ///
    /// # Errors
    ///
    /// Returns error if the vision call fails
    pub async fn label_frame(&self, jpeg: &[u8]) -> Result<Vec<String>> {
        self.labeler.label(jpeg).await
    }

    /// Grab one frame and return labels for the objects in it
    ///
    /// # Errors
    ///
    /// Returns error if the grab times out or the vision call fails
    pub async fn observe(&self) -> Result<Vec<String>> {
        let jpeg = self.capture_frame().await?;
        self.label_frame(&jpeg).await
    }
}

/// Drain buffered stale data, then read the next complete frame
fn grab_frame(mut port: &mut dyn serialport::SerialPort) -> Result<Vec<u8>> {
    port.clear(serialport::ClearBuffer::Input)
        .map_err(|e| Error::Camera(format!("failed to drain camera buffer: {e}")))?;

    read_frame(&mut port)
}

/// Read one length-prefixed JPEG frame
///
/// Wire format: `FF AA`, little-endian u32 payload length, payload, two
/// trailer bytes.
fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut byte = read_u8(reader)?;
    loop {
        if byte == FRAME_MARKER[0] {
            let next = read_u8(reader)?;
            if next == FRAME_MARKER[1] {
                break;
            }
            // The lookahead may itself start a marker
            byte = next;
        } else {
            byte = read_u8(reader)?;
        }
    }

    let mut length_bytes = [0u8; 4];
    reader.read_exact(&mut length_bytes)?;
    let length = u32::from_le_bytes(length_bytes);
    if length == 0 || length > MAX_FRAME_BYTES {
        return Err(Error::Camera(format!("implausible frame length {length}")));
    }

    let mut payload = vec![0u8; length as usize];
    reader.read_exact(&mut payload)?;

    let mut trailer = [0u8; 2];
    reader.read_exact(&mut trailer)?;

    Ok(payload)
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    Ok(byte[0])
}

/// Names objects in a JPEG using the Anthropic messages API
struct ImageLabeler {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_labels: usize,
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentBlock<'a> {
    #[serde(rename = "text")]
    Text { text: &'a str },
    #[serde(rename = "image")]
    Image { source: ImageSource<'a> },
}

#[derive(Debug, Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    source_type: &'a str,
    media_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    text: Option<String>,
}

impl ImageLabeler {
    fn new(api_key: String, model: String, max_labels: usize) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "Anthropic API key required for vision".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            max_labels,
        })
    }

    async fn label(&self, jpeg: &[u8]) -> Result<Vec<String>> {
        let base64_data = base64::engine::general_purpose::STANDARD.encode(jpeg);

        let request = MessageRequest {
            model: &self.model,
            max_tokens: 100,
            messages: vec![Message {
                role: "user",
                content: vec![
                    ContentBlock::Image {
                        source: ImageSource {
                            source_type: "base64",
                            media_type: "image/jpeg",
                            data: base64_data,
                        },
                    },
                    ContentBlock::Text {
                        text: LABEL_PROMPT,
                    },
                ],
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Vision(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Vision(format!("API error {status}: {body}")));
        }

        let result: MessageResponse = response
            .json()
            .await
            .map_err(|e| Error::Vision(format!("parse error: {e}")))?;

        let text = result
            .content
            .into_iter()
            .filter_map(|c| c.text)
            .collect::<Vec<_>>()
            .join(" ");

        let labels = parse_labels(&text, self.max_labels);
        tracing::debug!(labels = ?labels, "objects identified");
        Ok(labels)
    }
}

/// Split a comma-separated label reply into clean lowercase labels
fn parse_labels(text: &str, max: usize) -> Vec<String> {
    text.split(',')
        .map(|label| label.trim().trim_end_matches('.').to_lowercase())
        .filter(|label| !label.is_empty())
        .take(max)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut data = vec![0xFF, 0xAA];
        #[allow(clippy::cast_possible_truncation)]
        data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        data.extend_from_slice(payload);
        data.extend_from_slice(&[0xAB, 0xCD]);
        data
    }

    #[test]
    fn reads_a_clean_frame() {
        let payload = vec![0xDE, 0xAD, 0xBE, 0xEF];
        let mut cursor = Cursor::new(framed(&payload));

        assert_eq!(read_frame(&mut cursor).unwrap(), payload);
    }

    #[test]
    fn skips_garbage_before_the_marker() {
        let mut data = vec![0x00, 0x12, 0xFF, 0x07, 0x99];
        data.extend_from_slice(&framed(&[1, 2, 3]));
        let mut cursor = Cursor::new(data);

        assert_eq!(read_frame(&mut cursor).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn resyncs_on_repeated_marker_byte() {
        let mut data = vec![0xFF];
        data.extend_from_slice(&framed(&[9, 9]));
        let mut cursor = Cursor::new(data);

        assert_eq!(read_frame(&mut cursor).unwrap(), vec![9, 9]);
    }

    #[test]
    fn consumes_the_trailer_between_frames() {
        let mut data = framed(&[1]);
        data.extend_from_slice(&framed(&[2]));
        let mut cursor = Cursor::new(data);

        assert_eq!(read_frame(&mut cursor).unwrap(), vec![1]);
        assert_eq!(read_frame(&mut cursor).unwrap(), vec![2]);
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let mut data = vec![0xFF, 0xAA];
        data.extend_from_slice(&100u32.to_le_bytes());
        data.extend_from_slice(&[1, 2, 3]);
        let mut cursor = Cursor::new(data);

        assert!(read_frame(&mut cursor).is_err());
    }

    #[test]
    fn implausible_length_is_rejected() {
        let mut data = vec![0xFF, 0xAA];
        data.extend_from_slice(&u32::MAX.to_le_bytes());
        let mut cursor = Cursor::new(data);

        assert!(matches!(read_frame(&mut cursor), Err(Error::Camera(_))));
    }

    #[test]
    fn zero_length_is_rejected() {
        let mut data = vec![0xFF, 0xAA];
        data.extend_from_slice(&0u32.to_le_bytes());
        let mut cursor = Cursor::new(data);

        assert!(matches!(read_frame(&mut cursor), Err(Error::Camera(_))));
    }

    #[test]
    fn labels_are_trimmed_and_capped() {
        let labels = parse_labels("Cup, Person,  laptop. ", 3);
        assert_eq!(labels, vec!["cup", "person", "laptop"]);

        let capped = parse_labels("a, b, c, d, e", 3);
        assert_eq!(capped, vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_reply_yields_no_labels() {
        assert!(parse_labels("", 3).is_empty());
        assert!(parse_labels("  , ,  ", 3).is_empty());
    }
}

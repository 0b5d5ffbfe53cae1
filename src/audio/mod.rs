//! Audio capture, frame re-chunking, and playback

mod capture;
mod chunker;
mod playback;

pub use capture::{AudioCapture, samples_to_wav};
pub use chunker::{AudioFrame, FrameChunker};
pub use playback::AudioPlayback;

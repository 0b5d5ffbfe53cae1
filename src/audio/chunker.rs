//! Frame re-chunking
//!
//! Capture delivers sample blocks sized by the device's own buffering. The
//! chunker re-slices those arrivals into exact analysis frames, collapsing
//! interleaved multi-channel input to mono and carrying any remainder
//! forward to the next arrival.

/// One fixed-size analysis frame of mono samples
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Arrival order, starting at 0
    pub seq: u64,

    /// Exactly `frame_size` mono samples
    pub samples: Vec<f32>,
}

/// Re-slices arbitrary-length capture arrivals into fixed-size mono frames
#[derive(Debug)]
pub struct FrameChunker {
    frame_size: usize,
    channels: usize,
    /// Interleaved samples short of a full channel group
    raw: Vec<f32>,
    /// Mono samples awaiting a full frame
    pending: Vec<f32>,
    next_seq: u64,
}

impl FrameChunker {
    /// Create a chunker producing frames of `frame_size` mono samples from
    /// `channels`-interleaved input
    #[must_use]
    pub const fn new(frame_size: usize, channels: usize) -> Self {
        Self {
            frame_size,
            channels,
            raw: Vec::new(),
            pending: Vec::new(),
            next_seq: 0,
        }
    }

    /// Absorb one capture arrival, returning every frame it completes
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        self.collapse(samples);

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_size {
            let rest = self.pending.split_off(self.frame_size);
            let samples = std::mem::replace(&mut self.pending, rest);
            frames.push(AudioFrame {
                seq: self.next_seq,
                samples,
            });
            self.next_seq += 1;
        }
        frames
    }

    /// Mono samples currently carried, waiting for a full frame
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Average interleaved channel groups down to mono
    #[allow(clippy::cast_precision_loss)]
    fn collapse(&mut self, samples: &[f32]) {
        if self.channels <= 1 {
            self.pending.extend_from_slice(samples);
            return;
        }

        self.raw.extend_from_slice(samples);
        let complete = self.raw.len() / self.channels * self.channels;
        for group in self.raw[..complete].chunks_exact(self.channels) {
            let sum: f32 = group.iter().sum();
            self.pending.push(sum / self.channels as f32);
        }
        self.raw.drain(..complete);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_arrival_completes_nothing() {
        let mut chunker = FrameChunker::new(800, 1);
        assert!(chunker.push(&[0.1; 300]).is_empty());
        assert_eq!(chunker.pending_len(), 300);
    }

    #[test]
    fn exact_multiple_yields_all_frames() {
        let mut chunker = FrameChunker::new(4, 1);
        let frames = chunker.push(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].seq, 0);
        assert_eq!(frames[0].samples, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(frames[1].seq, 1);
        assert_eq!(frames[1].samples, vec![5.0, 6.0, 7.0, 8.0]);
        assert_eq!(chunker.pending_len(), 0);
    }

    #[test]
    fn remainder_carries_across_arrivals() {
        let mut chunker = FrameChunker::new(800, 1);

        assert!(chunker.push(&vec![0.2; 500]).is_empty());
        let frames = chunker.push(&vec![0.2; 500]);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples.len(), 800);
        assert_eq!(chunker.pending_len(), 200);
    }

    #[test]
    fn order_preserved_across_splits() {
        let mut chunker = FrameChunker::new(3, 1);
        #[allow(clippy::cast_precision_loss)]
        let ramp: Vec<f32> = (0..7).map(|i| i as f32).collect();

        let mut frames = chunker.push(&ramp[..4]);
        frames.extend(chunker.push(&ramp[4..]));

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].samples, vec![0.0, 1.0, 2.0]);
        assert_eq!(frames[1].samples, vec![3.0, 4.0, 5.0]);
        assert_eq!(chunker.pending_len(), 1);
    }

    #[test]
    fn stereo_collapses_to_channel_average() {
        let mut chunker = FrameChunker::new(2, 2);
        let frames = chunker.push(&[0.2, 0.4, -1.0, 1.0]);

        assert_eq!(frames.len(), 1);
        let samples = &frames[0].samples;
        assert!((samples[0] - 0.3).abs() < 1e-6);
        assert!(samples[1].abs() < 1e-6);
    }

    #[test]
    fn unpaired_stereo_sample_carries() {
        let mut chunker = FrameChunker::new(1, 2);

        let frames = chunker.push(&[0.5, 0.5, 0.8]);
        assert_eq!(frames.len(), 1);
        assert_eq!(chunker.pending_len(), 0);

        // The dangling 0.8 pairs with the next arrival's first sample
        let frames = chunker.push(&[0.2]);
        assert_eq!(frames.len(), 1);
        assert!((frames[0].samples[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn seq_increments_across_pushes() {
        let mut chunker = FrameChunker::new(2, 1);

        let first = chunker.push(&[0.0, 0.0]);
        let second = chunker.push(&[0.0, 0.0, 0.0, 0.0]);

        assert_eq!(first[0].seq, 0);
        assert_eq!(second[0].seq, 1);
        assert_eq!(second[1].seq, 2);
    }
}

use serde::{Deserialize, Serialize};

pub mod compose;
pub mod decode;
pub mod encode_export;
pub mod render;
pub mod wav;

pub use compose::{ComposeError, compose};
pub use decode::{DecodeError, decode_file};
pub use encode_export::{EncodeExportError, EncodeSettings, export_compressed};
pub use render::OfflineRenderer;
pub use wav::{WavError, encode_wav, read_wav, read_wav_bytes};

/// Planar multi-channel buffer of `f32` samples in `[-1, 1]`.
///
/// Every channel holds the same number of frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Buffer from per-channel sample vectors.
    pub fn from_planar(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        debug_assert!(
            channels.windows(2).all(|pair| pair[0].len() == pair[1].len()),
            "all channels must hold the same frame count"
        );
        Self {
            channels,
            sample_rate: sample_rate.max(1),
        }
    }

    /// Buffer from interleaved samples.
    pub fn from_interleaved(samples: &[f32], channel_count: u16, sample_rate: u32) -> Self {
        let channel_count = usize::from(channel_count.max(1));
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
        Self::from_planar(channels, sample_rate)
    }

    /// All-zero buffer of the given shape.
    pub fn silence(channel_count: usize, frames: usize, sample_rate: u32) -> Self {
        Self::from_planar(vec![vec![0.0; frames]; channel_count.max(1)], sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Samples of one channel.
    pub fn channel(&self, index: usize) -> &[f32] {
        self.channels
            .get(index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Samples of one channel, duplicating channel 0 for indexes past the
    /// buffer's own channel count (mono sources played through a wider bus).
    pub fn channel_or_first(&self, index: usize) -> &[f32] {
        self.channels
            .get(index)
            .or_else(|| self.channels.first())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Borrow all channels.
    pub fn planar(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Copy of the frame range `[start, end)` from every channel.
    pub fn slice_frames(&self, start: usize, end: usize) -> SampleBuffer {
        let end = end.min(self.frames());
        let start = start.min(end);
        let channels = self
            .channels
            .iter()
            .map(|channel| channel[start..end].to_vec())
            .collect();
        Self::from_planar(channels, self.sample_rate)
    }

    /// Interleave the channels into one sample stream.
    pub fn interleaved(&self) -> Vec<f32> {
        let frames = self.frames();
        let mut out = Vec::with_capacity(frames * self.channels.len());
        for frame in 0..frames {
            for channel in &self.channels {
                out.push(channel[frame]);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaved_round_trip() {
        let interleaved = [0.1, -0.1, 0.2, -0.2, 0.3, -0.3];
        let buffer = SampleBuffer::from_interleaved(&interleaved, 2, 44_100);
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frames(), 3);
        assert_eq!(buffer.channel(0), &[0.1, 0.2, 0.3]);
        assert_eq!(buffer.interleaved(), interleaved);
    }

    #[test]
    fn mono_duplicates_first_channel_for_wider_bus() {
        let buffer = SampleBuffer::from_planar(vec![vec![0.5, 0.6]], 44_100);
        assert_eq!(buffer.channel_or_first(1), &[0.5, 0.6]);
        assert!(buffer.channel(1).is_empty());
    }

    #[test]
    fn slice_clamps_to_frame_count() {
        let buffer = SampleBuffer::from_planar(vec![vec![1.0, 2.0, 3.0]], 10);
        let slice = buffer.slice_frames(1, 99);
        assert_eq!(slice.channel(0), &[2.0, 3.0]);
        assert_eq!(slice.sample_rate(), 10);
    }
}

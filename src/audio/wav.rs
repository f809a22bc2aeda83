//! Canonical 16-bit PCM WAV encoding, plus readers for our own files.
//!
//! The encoder is a pure function over a sample buffer: a fixed 44-byte
//! header (RIFF/WAVE, `fmt ` with format tag 1, then `data`) followed by
//! interleaved little-endian samples. Decoding of arbitrary containers is
//! not done here; see [`crate::audio::decode`].

use std::io::Cursor;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::SampleBuffer;

/// Errors when reading a WAV file back into a buffer.
#[derive(Debug, Error)]
pub enum WavError {
    #[error("Failed to read WAV file {path}: {source}")]
    File {
        path: PathBuf,
        source: hound::Error,
    },
    #[error("Failed to parse WAV data: {0}")]
    Data(#[from] hound::Error),
}

/// Encode a buffer as a canonical 16-bit PCM WAV byte stream.
///
/// Samples are clamped to `[-1, 1]` and quantized to `i16`. Deterministic;
/// performs no I/O.
pub fn encode_wav(buffer: &SampleBuffer) -> Vec<u8> {
    let channels = buffer.channel_count().max(1) as u16;
    let sample_rate = buffer.sample_rate();
    let frames = buffer.frames();
    let block_align = u32::from(channels) * 2;
    let data_len = frames as u32 * block_align;

    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * block_align).to_le_bytes());
    bytes.extend_from_slice(&(block_align as u16).to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());

    for frame in 0..frames {
        for channel in 0..usize::from(channels) {
            let sample = buffer.channel(channel).get(frame).copied().unwrap_or(0.0);
            let quantized = (sample.clamp(-1.0, 1.0) * 32_767.0).round() as i16;
            bytes.extend_from_slice(&quantized.to_le_bytes());
        }
    }
    bytes
}

/// Read a WAV file into a planar buffer.
pub fn read_wav(path: &Path) -> Result<SampleBuffer, WavError> {
    let reader = hound::WavReader::open(path).map_err(|source| WavError::File {
        path: path.to_path_buf(),
        source,
    })?;
    buffer_from_reader(reader)
}

/// Read in-memory WAV bytes into a planar buffer.
pub fn read_wav_bytes(bytes: &[u8]) -> Result<SampleBuffer, WavError> {
    buffer_from_reader(hound::WavReader::new(Cursor::new(bytes))?)
}

fn buffer_from_reader<R: std::io::Read>(
    mut reader: hound::WavReader<R>,
) -> Result<SampleBuffer, WavError> {
    let spec = reader.spec();
    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Float, _) => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()?,
        (hound::SampleFormat::Int, bits) => {
            let scale = (1u64 << (u32::from(bits.clamp(1, 32)) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };
    Ok(SampleBuffer::from_interleaved(
        &samples,
        spec.channels.max(1),
        spec.sample_rate.max(1),
    ))
}

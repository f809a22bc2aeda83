//! Symphonia-based decoding of arbitrary source containers into planar
//! buffers.

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::{
    audio::SampleBuffer as SymphoniaSampleBuffer, codecs::DecoderOptions, errors::Error,
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};
use thiserror::Error;

use super::SampleBuffer;

/// Errors produced while decoding a source file.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("No decoder accepts {path}: {detail}")]
    Unsupported { path: PathBuf, detail: String },
    #[error("Decode failed for {path}: {detail}")]
    Failed { path: PathBuf, detail: String },
    #[error("Decoded no audio from {path}")]
    Empty { path: PathBuf },
}

/// Decode a whole audio file into a planar buffer at its source rate.
pub fn decode_file(path: &Path) -> Result<SampleBuffer, DecodeError> {
    let file = File::open(path).map_err(|source| DecodeError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| DecodeError::Unsupported {
            path: path.to_path_buf(),
            detail: err.to_string(),
        })?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| DecodeError::Unsupported {
            path: path.to_path_buf(),
            detail: "no default track".to_string(),
        })?;
    let codec_params = &track.codec_params;
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| DecodeError::Unsupported {
            path: path.to_path_buf(),
            detail: "missing sample rate".to_string(),
        })?;
    let channels = codec_params
        .channels
        .map(|channels| channels.count())
        .unwrap_or(1)
        .max(1) as u16;

    let mut decoder = symphonia::default::get_codecs()
        .make(codec_params, &DecoderOptions::default())
        .map_err(|err| DecodeError::Unsupported {
            path: path.to_path_buf(),
            detail: err.to_string(),
        })?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(_)) => break,
            Err(err) => {
                return Err(DecodeError::Failed {
                    path: path.to_path_buf(),
                    detail: err.to_string(),
                });
            }
        };
        let audio_buf = match decoder.decode(&packet) {
            Ok(audio_buf) => audio_buf,
            // A corrupt packet is recoverable; resume on the next one.
            Err(Error::DecodeError(_)) => continue,
            Err(err) => {
                return Err(DecodeError::Failed {
                    path: path.to_path_buf(),
                    detail: err.to_string(),
                });
            }
        };
        let spec = *audio_buf.spec();
        let mut sample_buf = SymphoniaSampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(audio_buf);
        samples.extend_from_slice(sample_buf.samples());
    }

    if samples.is_empty() {
        return Err(DecodeError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(SampleBuffer::from_interleaved(&samples, channels, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_wav_fixture_at_source_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..2_205 {
            writer.write_sample(8_192i16).unwrap();
            writer.write_sample(-8_192i16).unwrap();
        }
        writer.finalize().unwrap();

        let buffer = decode_file(&path).unwrap();
        assert_eq!(buffer.sample_rate(), 22_050);
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frames(), 2_205);
        assert!((buffer.channel(0)[0] - 0.25).abs() < 1e-3);
        assert!((buffer.channel(1)[0] + 0.25).abs() < 1e-3);
    }

    #[test]
    fn garbage_bytes_are_not_decodable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.mp3");
        std::fs::write(&path, b"definitely not an mp3 stream").unwrap();
        let err = decode_file(&path).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Unsupported { .. } | DecodeError::Failed { .. } | DecodeError::Empty { .. }
        ));
    }

    #[test]
    fn missing_file_reports_open_error() {
        let err = decode_file(Path::new("/nonexistent/file.wav")).unwrap_err();
        assert!(matches!(err, DecodeError::Open { .. }));
    }
}

//! Clip extraction: decode, slice, render, encode.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rand::Rng;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use super::Clip;
use crate::audio::{DecodeError, OfflineRenderer, SampleBuffer, decode, wav};
use crate::library::AssetRecord;

/// Window length used by wild card extraction, in seconds.
pub const WILD_CARD_SECONDS: f64 = 60.0;

/// Containers the decoder is known to reject; checked up front so the user
/// sees a format error instead of a decoder failure.
const UNDECODABLE_EXTENSIONS: [&str; 2] = ["m4p", "wma"];

/// Errors from clip extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{path} is in a format that cannot be decoded")]
    UnsupportedFormat { path: PathBuf },
    #[error("Requested window at {start}s lies outside the source length of {source_duration}s")]
    InvalidRange { start: f64, source_duration: f64 },
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// A rendered clip plus its encoded audio, ready to persist.
#[derive(Debug, Clone)]
pub struct ExtractedClip {
    pub meta: Clip,
    pub wav: Vec<u8>,
}

/// Cut a window out of a source song and render it to WAV bytes.
///
/// The effective duration is `min(requested, source length - start)`; a
/// start at or past the end of the source fails with
/// [`ExtractError::InvalidRange`].
pub fn extract(
    renderer: &OfflineRenderer,
    source: &Path,
    start_seconds: f64,
    requested_seconds: f64,
) -> Result<ExtractedClip, ExtractError> {
    reject_undecodable(source)?;
    let decoded = decode::decode_file(source)?;
    clip_from_buffer(renderer, source, &decoded, start_seconds, requested_seconds)
}

/// Extract one random ~60s window from each selected song.
///
/// A failure on one song is logged and that song skipped; the batch returns
/// whatever succeeded.
pub fn extract_wild_cards(
    renderer: &OfflineRenderer,
    assets: &[AssetRecord],
) -> Vec<ExtractedClip> {
    let mut rng = rand::rng();
    let mut clips = Vec::new();
    for asset in assets {
        match wild_card_one(renderer, asset, &mut rng) {
            Ok(clip) => clips.push(clip),
            Err(err) => {
                warn!(
                    song = %asset.path.display(),
                    error = %err,
                    "Wild card extraction failed for one song; skipping it"
                );
            }
        }
    }
    clips
}

fn wild_card_one(
    renderer: &OfflineRenderer,
    asset: &AssetRecord,
    rng: &mut impl Rng,
) -> Result<ExtractedClip, ExtractError> {
    reject_undecodable(&asset.path)?;
    let decoded = decode::decode_file(&asset.path)?;
    let source_duration = decoded.duration_seconds();
    let latest_start = (source_duration - WILD_CARD_SECONDS).max(0.0);
    let start = rng.random_range(0.0..=latest_start);
    let requested = WILD_CARD_SECONDS.min(source_duration - start);
    clip_from_buffer(renderer, &asset.path, &decoded, start, requested)
}

fn clip_from_buffer(
    renderer: &OfflineRenderer,
    source: &Path,
    decoded: &SampleBuffer,
    start_seconds: f64,
    requested_seconds: f64,
) -> Result<ExtractedClip, ExtractError> {
    let start = start_seconds.max(0.0);
    let source_duration = decoded.duration_seconds();
    if start >= source_duration {
        return Err(ExtractError::InvalidRange {
            start,
            source_duration,
        });
    }
    let duration = requested_seconds.min(source_duration - start);
    if duration <= 0.0 {
        return Err(ExtractError::InvalidRange {
            start,
            source_duration,
        });
    }

    let rate = f64::from(decoded.sample_rate());
    let start_frame = (start * rate).floor() as usize;
    let end_frame = ((start + duration) * rate).floor() as usize;
    let sliced = decoded.slice_frames(start_frame, end_frame);
    let rendered = renderer.render(&sliced);

    let base = source_base_name(source);
    let meta = Clip {
        id: Uuid::new_v4().to_string(),
        name: format!(
            "{base} [{} - {}]",
            format_timestamp(start),
            format_timestamp(start + duration)
        ),
        source_song_name: base,
        start,
        duration,
        clip_path: None,
        extensions: BTreeMap::new(),
    };
    Ok(ExtractedClip {
        meta,
        wav: wav::encode_wav(&rendered),
    })
}

fn reject_undecodable(path: &Path) -> Result<(), ExtractError> {
    let undecodable = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            UNDECODABLE_EXTENSIONS
                .iter()
                .any(|blocked| ext.eq_ignore_ascii_case(blocked))
        });
    if undecodable {
        return Err(ExtractError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn source_base_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("clip")
        .to_string()
}

/// Whole seconds as `mm:ss`.
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_tone(path: &Path, seconds: f64, sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let frames = (seconds * f64::from(sample_rate)) as usize;
        for idx in 0..frames {
            let value = if idx % 2 == 0 { 8_000i16 } else { -8_000i16 };
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn asset(path: &Path) -> AssetRecord {
        AssetRecord::untagged(path.to_path_buf(), "song".into(), 1)
    }

    #[test]
    fn duration_is_clamped_to_source_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("three_seconds.wav");
        write_tone(&path, 3.0, 8_000);

        let renderer = OfflineRenderer::new(8_000);
        let extracted = extract(&renderer, &path, 1.0, 60.0).unwrap();
        assert!((extracted.meta.duration - 2.0).abs() < 1e-6);
        assert_eq!(extracted.meta.name, "three_seconds [00:01 - 00:03]");
        assert_eq!(extracted.meta.source_song_name, "three_seconds");

        let decoded = crate::audio::read_wav_bytes(&extracted.wav).unwrap();
        assert_eq!(decoded.frames(), 2 * 8_000);
    }

    #[test]
    fn start_past_the_end_is_invalid_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        write_tone(&path, 2.0, 8_000);

        let renderer = OfflineRenderer::new(8_000);
        let err = extract(&renderer, &path, 100.0, 10.0).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidRange { .. }));
    }

    #[test]
    fn undecodable_container_is_rejected_before_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protected.m4p");
        std::fs::write(&path, b"opaque").unwrap();

        let renderer = OfflineRenderer::default();
        let err = extract(&renderer, &path, 0.0, 10.0).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat { .. }));
    }

    #[test]
    fn rendered_clip_comes_out_at_context_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_tone(&path, 2.0, 8_000);

        let renderer = OfflineRenderer::new(16_000);
        let extracted = extract(&renderer, &path, 0.0, 1.0).unwrap();
        let decoded = crate::audio::read_wav_bytes(&extracted.wav).unwrap();
        assert_eq!(decoded.sample_rate(), 16_000);
        assert_eq!(decoded.frames(), 16_000);
    }

    #[test]
    fn wild_cards_skip_failing_songs() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.wav");
        write_tone(&good, 4.0, 8_000);
        let bad = dir.path().join("bad.wav");
        std::fs::write(&bad, b"not audio").unwrap();

        let renderer = OfflineRenderer::new(8_000);
        let clips = extract_wild_cards(&renderer, &[asset(&good), asset(&bad)]);
        assert_eq!(clips.len(), 1);
        let clip = &clips[0].meta;
        assert!(clip.start >= 0.0);
        assert!(clip.duration > 0.0);
        assert!(clip.start + clip.duration <= 4.0 + 1e-6);
    }

    #[test]
    fn timestamps_format_as_minutes_and_seconds() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(75.4), "01:15");
        assert_eq!(format_timestamp(600.0), "10:00");
    }
}

//! Compressed (non-WAV) export through an external encoder process.
//!
//! This path is deliberately decoupled from the in-memory compositor: every
//! input is normalized to one fixed rate/channel layout, staged as WAV
//! parts, and the concatenation happens inside the encoder via its concat
//! demuxer. The encoder binary resolves from an explicit override, then the
//! `POWERHOUR_FFMPEG_PATH` environment variable, then `ffmpeg` on PATH.

use std::{
    path::{Path, PathBuf},
    process::Command,
};

use thiserror::Error;
use tracing::info;

use super::{SampleBuffer, render, wav};

const ENCODER_ENV_KEY: &str = "POWERHOUR_FFMPEG_PATH";
const DEFAULT_ENCODER: &str = "ffmpeg";

/// Fixed output layout for compressed exports.
#[derive(Debug, Clone, Copy)]
pub struct EncodeSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate_kbps: u32,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            sample_rate: crate::config::DEFAULT_RENDER_SAMPLE_RATE,
            channels: 2,
            bitrate_kbps: 192,
        }
    }
}

/// Errors from the compressed export path.
#[derive(Debug, Error)]
pub enum EncodeExportError {
    #[error("Failed to stage encoder input {path}: {source}")]
    Stage {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not run encoder {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("Encoder exited with {status}")]
    Failed { status: std::process::ExitStatus },
    #[error("Nothing to export")]
    Empty,
}

/// Resolve the encoder binary to invoke.
pub fn resolve_encoder(configured: Option<&Path>) -> PathBuf {
    if let Some(path) = configured {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(ENCODER_ENV_KEY) {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_ENCODER)
}

/// Export clips (with the interstitial between them) as one compressed file.
///
/// The destination's extension chooses the codec; the encoder is trusted to
/// map it. Inputs are normalized before staging so the encoder sees one
/// uniform stream.
pub fn export_compressed(
    clips: &[SampleBuffer],
    interstitial: Option<&SampleBuffer>,
    dest: &Path,
    settings: EncodeSettings,
    encoder_override: Option<&Path>,
) -> Result<(), EncodeExportError> {
    if clips.is_empty() {
        return Err(EncodeExportError::Empty);
    }
    let staging = tempfile::tempdir().map_err(|source| EncodeExportError::Stage {
        path: std::env::temp_dir(),
        source,
    })?;

    let mut part_names = Vec::new();
    for (idx, clip) in clips.iter().enumerate() {
        if idx > 0 {
            if let Some(gap) = interstitial {
                part_names.push(stage_part(staging.path(), part_names.len(), gap, settings)?);
            }
        }
        part_names.push(stage_part(staging.path(), part_names.len(), clip, settings)?);
    }

    let list_path = staging.path().join("concat.txt");
    std::fs::write(&list_path, build_concat_list(&part_names)).map_err(|source| {
        EncodeExportError::Stage {
            path: list_path.clone(),
            source,
        }
    })?;

    let program = resolve_encoder(encoder_override);
    let status = Command::new(&program)
        .current_dir(staging.path())
        .args(["-y", "-f", "concat", "-safe", "0", "-i"])
        .arg(&list_path)
        .args([
            "-ar",
            &settings.sample_rate.to_string(),
            "-ac",
            &settings.channels.to_string(),
            "-b:a",
            &format!("{}k", settings.bitrate_kbps),
        ])
        .arg(dest)
        .status()
        .map_err(|source| EncodeExportError::Spawn { program, source })?;
    if !status.success() {
        return Err(EncodeExportError::Failed { status });
    }
    info!(dest = %dest.display(), parts = part_names.len(), "Compressed export finished");
    Ok(())
}

fn stage_part(
    dir: &Path,
    index: usize,
    buffer: &SampleBuffer,
    settings: EncodeSettings,
) -> Result<String, EncodeExportError> {
    let name = format!("part_{index:03}.wav");
    let path = dir.join(&name);
    let bytes = wav::encode_wav(&normalize(buffer, settings));
    std::fs::write(&path, bytes).map_err(|source| EncodeExportError::Stage { path, source })?;
    Ok(name)
}

/// Conform a buffer to the fixed export layout.
pub(crate) fn normalize(buffer: &SampleBuffer, settings: EncodeSettings) -> SampleBuffer {
    let rendered = render::OfflineRenderer::new(settings.sample_rate).render(buffer);
    if rendered.channel_count() == usize::from(settings.channels) {
        return rendered;
    }
    let channels = (0..usize::from(settings.channels.max(1)))
        .map(|index| rendered.channel_or_first(index).to_vec())
        .collect();
    SampleBuffer::from_planar(channels, settings.sample_rate)
}

fn build_concat_list(part_names: &[String]) -> String {
    let mut list = String::new();
    for name in part_names {
        list.push_str("file '");
        list.push_str(name);
        list.push_str("'\n");
    }
    list
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_conforms_rate_and_channels() {
        let settings = EncodeSettings {
            sample_rate: 48_000,
            channels: 2,
            bitrate_kbps: 192,
        };
        let mono = SampleBuffer::silence(1, 44_100, 44_100);
        let normalized = normalize(&mono, settings);
        assert_eq!(normalized.sample_rate(), 48_000);
        assert_eq!(normalized.channel_count(), 2);
        assert_eq!(normalized.frames(), 48_000);
    }

    #[test]
    fn concat_list_quotes_each_part_in_order() {
        let names = vec!["part_000.wav".to_string(), "part_001.wav".to_string()];
        assert_eq!(
            build_concat_list(&names),
            "file 'part_000.wav'\nfile 'part_001.wav'\n"
        );
    }

    #[test]
    fn configured_encoder_path_wins() {
        let configured = PathBuf::from("/opt/tools/ffmpeg");
        assert_eq!(resolve_encoder(Some(&configured)), configured);
    }

    #[test]
    fn empty_export_is_rejected() {
        let err = export_compressed(
            &[],
            None,
            Path::new("/tmp/out.mp3"),
            EncodeSettings::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, EncodeExportError::Empty));
    }
}

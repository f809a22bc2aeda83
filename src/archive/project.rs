//! Project archives: one mix, its audio, backed-up originals, referenced
//! clips, and the interstitial sound, zipped behind a manifest.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::{ArchiveError, copy_dir_recursive, io_error, zipio};
use crate::app_dirs::StorageLayout;
use crate::clips::ClipStore;
use crate::mixes::{Mix, MixStore, now_rfc3339};

/// Manifest `type` value identifying a project archive.
pub const PROJECT_MANIFEST_TYPE: &str = "power-hour-project";
/// Conventional file extension for project archives.
pub const PROJECT_ARCHIVE_EXTENSION: &str = "phproject";

/// `manifest.json` at the root of every project archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectManifest {
    #[serde(rename = "type")]
    pub archive_type: String,
    pub version: u32,
    pub created: String,
    pub mix_id: String,
    pub mix_name: String,
    pub has_original_files: bool,
    pub clip_count: usize,
    pub has_drinking_sound: bool,
}

/// Package a stored mix into a project archive at `dest`.
///
/// Individually missing assets (audio, backups, clips, interstitial) are
/// logged and left out; only a missing mix record fails the export.
pub fn export_project(
    layout: &StorageLayout,
    mixes: &MixStore,
    clips: &ClipStore,
    mix_id: &str,
    dest: &Path,
    drinking_sound: Option<&Path>,
) -> Result<ProjectManifest, ArchiveError> {
    let mix = match mixes.load(mix_id) {
        Ok(mix) => mix,
        Err(crate::mixes::MixStoreError::NotFound(id)) => {
            return Err(ArchiveError::NotFound(format!("No mix found for '{id}'")));
        }
        Err(err) => return Err(err.into()),
    };

    let staging = tempfile::tempdir().map_err(io_error(std::env::temp_dir()))?;
    let stage = staging.path();

    write_json(&stage.join("mix.json"), &mix)?;
    match mixes.wav_path(&mix) {
        Ok(wav) => {
            std::fs::copy(&wav, stage.join("mix.wav")).map_err(io_error(&wav))?;
        }
        Err(_) => {
            warn!(mix = %mix.id, "Mix audio missing; exporting project without mix.wav");
        }
    }

    let backup_dir = layout.backups_dir()?.join(&mix.id);
    let has_original_files = backup_dir.is_dir();
    if has_original_files {
        copy_dir_recursive(&backup_dir, &stage.join("original_files"))?;
    }

    let clips_stage = stage.join("clips");
    std::fs::create_dir_all(&clips_stage).map_err(io_error(&clips_stage))?;
    let mut clip_count = 0usize;
    for clip_ref in &mix.clips {
        match clips.resolve_wav(&clip_ref.id)? {
            Some(source) => {
                let target = clips_stage.join(format!("{}.wav", clip_ref.id));
                std::fs::copy(&source, &target).map_err(io_error(&source))?;
                clip_count += 1;
            }
            None => {
                warn!(clip = %clip_ref.id, "Referenced clip missing; leaving it out of the archive");
            }
        }
    }

    let has_drinking_sound = match drinking_sound {
        Some(sound) if sound.is_file() => {
            let name = sound
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| "drinking.wav".to_string());
            let drinking_dir = stage.join("drinking");
            std::fs::create_dir_all(&drinking_dir).map_err(io_error(&drinking_dir))?;
            std::fs::copy(sound, drinking_dir.join(name)).map_err(io_error(sound))?;
            true
        }
        Some(sound) => {
            warn!(path = %sound.display(), "Configured interstitial sound missing; skipping it");
            false
        }
        None => false,
    };

    let manifest = ProjectManifest {
        archive_type: PROJECT_MANIFEST_TYPE.to_string(),
        version: super::ARCHIVE_VERSION,
        created: now_rfc3339(),
        mix_id: mix.id.clone(),
        mix_name: mix.name.clone(),
        has_original_files,
        clip_count,
        has_drinking_sound,
    };
    write_json(&stage.join("manifest.json"), &manifest)?;

    zipio::zip_dir(stage, dest)?;
    info!(mix = %mix.id, dest = %dest.display(), clip_count, "Exported project archive");
    Ok(manifest)
}

/// Import a project archive, installing the mix under a freshly minted id.
///
/// Clip files keep their original ids; only the mix id is new, so a
/// re-import can never collide with an existing local mix.
pub fn import_project(
    layout: &StorageLayout,
    mixes: &MixStore,
    zip_path: &Path,
) -> Result<Mix, ArchiveError> {
    let staging = tempfile::tempdir().map_err(io_error(std::env::temp_dir()))?;
    let stage = staging.path();
    zipio::unzip_to_dir(zip_path, stage)
        .map_err(|err| ArchiveError::InvalidArchive(err.to_string()))?;

    let manifest_path = stage.join("manifest.json");
    if !manifest_path.is_file() {
        return Err(ArchiveError::InvalidArchive(
            "missing manifest.json".to_string(),
        ));
    }
    let manifest: ProjectManifest = read_json(&manifest_path)?;
    if manifest.archive_type != PROJECT_MANIFEST_TYPE {
        return Err(ArchiveError::InvalidArchive(format!(
            "unexpected archive type '{}'",
            manifest.archive_type
        )));
    }

    let mix_record_path = stage.join("mix.json");
    if !mix_record_path.is_file() {
        return Err(ArchiveError::InvalidArchive("missing mix.json".to_string()));
    }
    let mut mix: Mix = read_json(&mix_record_path)?;
    mix.id = Uuid::new_v4().to_string();

    let mix_wav = stage.join("mix.wav");
    if mix_wav.is_file() {
        let target = layout.mixes_dir()?.join(format!("{}.wav", mix.id));
        std::fs::copy(&mix_wav, &target).map_err(io_error(&mix_wav))?;
    } else {
        warn!(archive = %zip_path.display(), "Archive has no mix.wav; importing record only");
    }
    mixes.save_record(&mix)?;

    let original_files = stage.join("original_files");
    if original_files.is_dir() {
        let backup = layout.backup_dir_for(&mix.id)?;
        copy_dir_recursive(&original_files, &backup)?;
    }

    let clips_dir = stage.join("clips");
    if clips_dir.is_dir() {
        let temp_clips = layout.temp_clips_dir()?;
        let entries = std::fs::read_dir(&clips_dir).map_err(io_error(&clips_dir))?;
        for entry in entries.filter_map(|entry| entry.ok()) {
            let source = entry.path();
            let Some(name) = source.file_name() else {
                continue;
            };
            let target = temp_clips.join(name);
            if target.exists() {
                // An identical clip id is already installed locally.
                continue;
            }
            std::fs::copy(&source, &target).map_err(io_error(&source))?;
        }
    }

    info!(mix = %mix.id, archive = %zip_path.display(), "Imported project archive");
    Ok(mix)
}

pub(super) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ArchiveError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| ArchiveError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(io_error(path))
}

pub(super) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ArchiveError> {
    let text = std::fs::read_to_string(path).map_err(io_error(path))?;
    serde_json::from_str(&text)
        .map_err(|err| ArchiveError::InvalidArchive(format!("{}: {err}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clips::Clip;
    use crate::mixes::ClipRef;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn seeded_mix(layout: &StorageLayout) -> (MixStore, ClipStore, Mix) {
        let mixes = MixStore::new(layout.clone());
        let clips = ClipStore::new(layout.clone());
        let clip = Clip {
            id: "clip-1".into(),
            name: "Song [00:00 - 00:05]".into(),
            source_song_name: "Song".into(),
            start: 0.0,
            duration: 5.0,
            clip_path: None,
            extensions: BTreeMap::new(),
        };
        clips.save_temp(&clip, b"RIFF clip audio").unwrap();

        let mut mix = Mix::new("Export Me");
        mix.push_clip(ClipRef::from(&clip));
        mix.push_clip(ClipRef {
            id: "ghost".into(),
            name: "gone".into(),
            start: 0.0,
            duration: 5.0,
            song_name: "Song".into(),
            clip_path: None,
        });
        let mix = mixes.save(&mix, b"RIFF mix audio").unwrap();
        (mixes, clips, mix)
    }

    #[test]
    fn export_packages_manifest_mix_and_clips() {
        let dir = tempdir().unwrap();
        let layout = StorageLayout::at(dir.path().join("store"));
        let (mixes, clips, mix) = seeded_mix(&layout);

        let backup = layout.backup_dir_for(&mix.id).unwrap();
        std::fs::write(backup.join("original.mp3"), b"original bytes").unwrap();
        let drink = dir.path().join("clink.wav");
        std::fs::write(&drink, b"RIFF clink").unwrap();

        let dest = dir.path().join("party.phproject");
        let manifest =
            export_project(&layout, &mixes, &clips, &mix.id, &dest, Some(&drink)).unwrap();
        assert_eq!(manifest.archive_type, PROJECT_MANIFEST_TYPE);
        assert_eq!(manifest.clip_count, 1);
        assert!(manifest.has_original_files);
        assert!(manifest.has_drinking_sound);

        let out = dir.path().join("unpacked");
        zipio::unzip_to_dir(&dest, &out).unwrap();
        assert!(out.join("manifest.json").is_file());
        assert!(out.join("mix.json").is_file());
        assert!(out.join("mix.wav").is_file());
        assert!(out.join("clips/clip-1.wav").is_file());
        assert!(out.join("original_files/original.mp3").is_file());
        assert!(out.join("drinking/clink.wav").is_file());
    }

    #[test]
    fn round_trip_mints_a_fresh_mix_id_and_keeps_clips() {
        let dir = tempdir().unwrap();
        let layout = StorageLayout::at(dir.path().join("store"));
        let (mixes, clips, mix) = seeded_mix(&layout);
        let dest = dir.path().join("party.phproject");
        export_project(&layout, &mixes, &clips, &mix.id, &dest, None).unwrap();

        let other = StorageLayout::at(dir.path().join("other"));
        let other_mixes = MixStore::new(other.clone());
        let imported = import_project(&other, &other_mixes, &dest).unwrap();
        assert_ne!(imported.id, mix.id);
        assert_eq!(imported.name, mix.name);
        assert_eq!(imported.clips.len(), mix.clips.len());
        assert_eq!(
            imported.clips.iter().map(|c| &c.name).collect::<Vec<_>>(),
            mix.clips.iter().map(|c| &c.name).collect::<Vec<_>>()
        );

        assert!(other_mixes.load(&imported.id).is_ok());
        assert!(
            other
                .temp_clips_dir()
                .unwrap()
                .join("clip-1.wav")
                .is_file()
        );
    }

    #[test]
    fn missing_manifest_is_invalid_and_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let stage = dir.path().join("stage");
        std::fs::create_dir_all(&stage).unwrap();
        std::fs::write(stage.join("mix.json"), b"{}").unwrap();
        let archive = dir.path().join("bad.phproject");
        zipio::zip_dir(&stage, &archive).unwrap();

        let layout = StorageLayout::at(dir.path().join("store"));
        let mixes = MixStore::new(layout.clone());
        let err = import_project(&layout, &mixes, &archive).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidArchive(_)));
        assert!(mixes.list().unwrap().is_empty());
    }

    #[test]
    fn wrong_manifest_type_is_invalid() {
        let dir = tempdir().unwrap();
        let stage = dir.path().join("stage");
        std::fs::create_dir_all(&stage).unwrap();
        let manifest = ProjectManifest {
            archive_type: "something-else".into(),
            version: 1,
            created: now_rfc3339(),
            mix_id: "x".into(),
            mix_name: "x".into(),
            has_original_files: false,
            clip_count: 0,
            has_drinking_sound: false,
        };
        write_json(&stage.join("manifest.json"), &manifest).unwrap();
        write_json(&stage.join("mix.json"), &Mix::new("x")).unwrap();
        let archive = dir.path().join("wrong.phproject");
        zipio::zip_dir(&stage, &archive).unwrap();

        let layout = StorageLayout::at(dir.path().join("store"));
        let mixes = MixStore::new(layout.clone());
        let err = import_project(&layout, &mixes, &archive).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidArchive(_)));
    }

    #[test]
    fn exporting_a_missing_mix_is_not_found() {
        let dir = tempdir().unwrap();
        let layout = StorageLayout::at(dir.path());
        let err = export_project(
            &layout,
            &MixStore::new(layout.clone()),
            &ClipStore::new(layout.clone()),
            "no-such-mix",
            &dir.path().join("never.phproject"),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound(_)));
    }
}

//! Playlist archives: the playlist record, each resolvable clip with its
//! sidecar, and the interstitial sound at the archive root.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use uuid::Uuid;

use super::project::{read_json, write_json};
use super::{ArchiveError, io_error, resolver, zipio};
use crate::app_dirs::StorageLayout;
use crate::clips::{Clip, ClipStore};
use crate::mixes::{ClipRef, now_rfc3339};
use crate::playlists::{Playlist, PlaylistImportInfo, PlaylistExportInfo, PlaylistStore};

/// Conventional file extension for playlist archives.
pub const PLAYLIST_ARCHIVE_EXTENSION: &str = "phpl";

/// Package a stored playlist into an archive at `dest`.
///
/// Each clip resolves through its pinned `clipPath` first, then the local
/// clip stores. Unresolvable clips stay in the record with a null path and
/// are excluded from the valid count; they never abort the export.
pub fn export_playlist(
    playlists: &PlaylistStore,
    clips: &ClipStore,
    playlist_id: &str,
    dest: &Path,
) -> Result<Playlist, ArchiveError> {
    let playlist = match playlists.load(playlist_id) {
        Ok(playlist) => playlist,
        Err(crate::playlists::PlaylistStoreError::NotFound(id)) => {
            return Err(ArchiveError::NotFound(format!(
                "No playlist found for '{id}'"
            )));
        }
        Err(err) => return Err(err.into()),
    };

    let staging = tempfile::tempdir().map_err(io_error(std::env::temp_dir()))?;
    let stage = staging.path();
    let clips_stage = stage.join("clips");
    std::fs::create_dir_all(&clips_stage).map_err(io_error(&clips_stage))?;

    let mut archived = playlist.clone();
    let mut valid_clips = 0usize;
    for clip_ref in &mut archived.clips {
        let source = resolve_clip_audio(clips, clip_ref)?;
        let Some(source) = source else {
            warn!(clip = %clip_ref.id, "Clip unresolvable; marking it invalid in the archive");
            clip_ref.clip_path = None;
            continue;
        };

        let wav_name = format!("{}.wav", clip_ref.id);
        std::fs::copy(&source, clips_stage.join(&wav_name)).map_err(io_error(&source))?;
        stage_sidecar(&clips_stage, &source, clip_ref)?;
        clip_ref.clip_path = Some(PathBuf::from(format!("clips/{wav_name}")));
        valid_clips += 1;
    }

    if let Some(sound) = &archived.drinking_sound_path {
        if sound.is_file() {
            let name = sound
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| "drinking.wav".to_string());
            std::fs::copy(sound, stage.join(name)).map_err(io_error(sound))?;
        } else {
            warn!(path = %sound.display(), "Playlist interstitial sound missing; archive omits it");
        }
    }

    archived.export_info = Some(PlaylistExportInfo {
        exported_at: now_rfc3339(),
        total_clips: archived.clips.len(),
        valid_clips,
    });
    write_json(&stage.join("playlist.json"), &archived)?;

    zipio::zip_dir(stage, dest)?;
    info!(
        playlist = %playlist.id,
        dest = %dest.display(),
        valid_clips,
        total_clips = archived.clips.len(),
        "Exported playlist archive"
    );
    Ok(archived)
}

/// Import a playlist archive under a freshly minted playlist id.
///
/// Clip ids are preserved: each archived clip lands in a per-clip folder
/// keyed by its original id, and `clipPath` is rewritten to that local
/// location. The record is persisted before returning.
pub fn import_playlist(
    layout: &StorageLayout,
    playlists: &PlaylistStore,
    zip_path: &Path,
) -> Result<Playlist, ArchiveError> {
    if !zipio::has_zip_signature(zip_path)? {
        return Err(ArchiveError::InvalidArchive(format!(
            "{} is not a zip archive",
            zip_path.display()
        )));
    }
    let staging = tempfile::tempdir().map_err(io_error(std::env::temp_dir()))?;
    let stage = staging.path();
    zipio::unzip_to_dir(zip_path, stage)
        .map_err(|err| ArchiveError::InvalidArchive(err.to_string()))?;

    let record_path = stage.join("playlist.json");
    if !record_path.is_file() {
        return Err(ArchiveError::InvalidArchive(
            "missing playlist.json".to_string(),
        ));
    }
    let mut playlist: Playlist = read_json(&record_path)?;
    playlist.id = Uuid::new_v4().to_string();

    let archived_clips = stage.join("clips");
    let mut valid_clips = 0usize;
    for clip_ref in &mut playlist.clips {
        let Some(source) = resolver::resolve_audio(&archived_clips, &clip_ref.id) else {
            warn!(clip = %clip_ref.id, "Archived clip audio missing; keeping the reference as invalid");
            clip_ref.clip_path = None;
            continue;
        };
        let clip_dir = layout.clip_dir_for(&clip_ref.id)?;
        let target = clip_dir.join(format!("{}.wav", clip_ref.id));
        if !target.exists() {
            std::fs::copy(&source, &target).map_err(io_error(&source))?;
        }
        install_sidecar(&archived_clips, &clip_dir, clip_ref, &target)?;
        clip_ref.clip_path = Some(target);
        valid_clips += 1;
    }

    if let Some(sound) = playlist.drinking_sound_path.take() {
        let name = sound
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "drinking.wav".to_string());
        let archived_sound = stage.join(&name);
        if archived_sound.is_file() {
            let assets = layout.playlist_assets_dir(&playlist.id)?;
            let target = assets.join(&name);
            std::fs::copy(&archived_sound, &target).map_err(io_error(&archived_sound))?;
            playlist.drinking_sound_path = Some(target);
        } else {
            warn!(sound = %name, "Declared interstitial sound absent from archive");
        }
    }

    playlist.import_info = Some(PlaylistImportInfo {
        imported_at: now_rfc3339(),
        total_clips: playlist.clips.len(),
        valid_clips,
        source_file: zip_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default(),
    });
    let playlist = playlists.save(&playlist)?;
    info!(
        playlist = %playlist.id,
        archive = %zip_path.display(),
        valid_clips,
        "Imported playlist archive"
    );
    Ok(playlist)
}

fn resolve_clip_audio(
    clips: &ClipStore,
    clip_ref: &ClipRef,
) -> Result<Option<PathBuf>, ArchiveError> {
    if let Some(pinned) = &clip_ref.clip_path {
        if pinned.is_file() {
            return Ok(Some(pinned.clone()));
        }
    }
    Ok(clips.resolve_wav(&clip_ref.id)?)
}

/// Copy the clip's sidecar next to its audio in the archive, rebuilding it
/// from the reference when the stored one is missing or unreadable.
fn stage_sidecar(
    clips_stage: &Path,
    audio_source: &Path,
    clip_ref: &ClipRef,
) -> Result<(), ArchiveError> {
    let target = clips_stage.join(format!("{}.json", clip_ref.id));
    if let Some(existing) = sidecar_next_to(audio_source, &clip_ref.id) {
        std::fs::copy(&existing, &target).map_err(io_error(&existing))?;
        return Ok(());
    }
    write_json(&target, &reconstructed_clip(clip_ref, None))
}

/// Write the imported clip's sidecar, repairing whatever the archive carried.
fn install_sidecar(
    archived_clips: &Path,
    clip_dir: &Path,
    clip_ref: &ClipRef,
    local_audio: &Path,
) -> Result<(), ArchiveError> {
    let target = clip_dir.join(format!("{}.json", clip_ref.id));
    let archived = archived_clips.join(format!("{}.json", clip_ref.id));
    let mut clip = match std::fs::read_to_string(&archived)
        .ok()
        .and_then(|text| serde_json::from_str::<Clip>(&text).ok())
    {
        Some(clip) => clip,
        None => reconstructed_clip(clip_ref, None),
    };
    clip.id = clip_ref.id.clone();
    clip.clip_path = Some(local_audio.to_path_buf());
    write_json(&target, &clip)
}

fn reconstructed_clip(clip_ref: &ClipRef, clip_path: Option<PathBuf>) -> Clip {
    Clip {
        id: clip_ref.id.clone(),
        name: clip_ref.name.clone(),
        source_song_name: clip_ref.song_name.clone(),
        start: clip_ref.start,
        duration: clip_ref.duration,
        clip_path,
        extensions: BTreeMap::new(),
    }
}

fn sidecar_next_to(audio_path: &Path, clip_id: &str) -> Option<PathBuf> {
    let dir = audio_path.parent()?;
    let sidecar = dir.join(format!("{clip_id}.json"));
    sidecar.is_file().then_some(sidecar)
}

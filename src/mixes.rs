//! Rendered mixes: metadata records, the 60-clip cap, and the on-disk
//! `mixes/{id}.wav` + `{id}.json` store.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::warn;
use uuid::Uuid;

use crate::app_dirs::{AppDirError, StorageLayout};
use crate::archive::resolver;

/// Hard cap on clips per mix or playlist; attempts past it are ignored.
pub const MAX_CLIPS: usize = 60;

/// Reference to a clip inside a mix or playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipRef {
    pub id: String,
    pub name: String,
    pub start: f64,
    pub duration: f64,
    pub song_name: String,
    /// Pinned audio location; playlists carry this, mixes usually don't.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_path: Option<PathBuf>,
}

impl From<&crate::clips::Clip> for ClipRef {
    fn from(clip: &crate::clips::Clip) -> Self {
        Self {
            id: clip.id.clone(),
            name: clip.name.clone(),
            start: clip.start,
            duration: clip.duration,
            song_name: clip.source_song_name.clone(),
            clip_path: clip.clip_path.clone(),
        }
    }
}

/// A named composite mix: one rendered audio file plus this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mix {
    pub id: String,
    pub name: String,
    pub created_at: String,
    #[serde(default)]
    pub clips: Vec<ClipRef>,
    #[serde(default)]
    pub has_interstitial: bool,
    /// Original song provenance kept for later re-editing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_project_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, String>,
}

impl Mix {
    /// Fresh mix with a new id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            created_at: now_rfc3339(),
            clips: Vec::new(),
            has_interstitial: false,
            source_project_data: None,
            extensions: BTreeMap::new(),
        }
    }

    /// Append a clip reference, refusing once the cap is reached.
    /// Returns whether the clip was added.
    pub fn push_clip(&mut self, clip: ClipRef) -> bool {
        if self.clips.len() >= MAX_CLIPS {
            warn!(mix = %self.name, "Clip cap of {MAX_CLIPS} reached; ignoring additional clip");
            return false;
        }
        self.clips.push(clip);
        true
    }
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Errors from the mix store.
#[derive(Debug, Error)]
pub enum MixStoreError {
    #[error(transparent)]
    AppDir(#[from] AppDirError),
    #[error("Mix file operation failed for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Mix record {path} could not be encoded or parsed: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("No mix found for '{0}'")]
    NotFound(String),
}

/// On-disk store for rendered mixes.
#[derive(Debug, Clone)]
pub struct MixStore {
    layout: StorageLayout,
}

impl MixStore {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// Write a mix's audio and record, truncating past the clip cap.
    pub fn save(&self, mix: &Mix, wav: &[u8]) -> Result<Mix, MixStoreError> {
        let mut mix = mix.clone();
        if mix.clips.len() > MAX_CLIPS {
            warn!(
                mix = %mix.name,
                dropped = mix.clips.len() - MAX_CLIPS,
                "Truncating mix to the clip cap"
            );
            mix.clips.truncate(MAX_CLIPS);
        }
        let dir = self.layout.mixes_dir()?;
        let wav_path = dir.join(format!("{}.wav", mix.id));
        std::fs::write(&wav_path, wav).map_err(|source| MixStoreError::Io {
            path: wav_path,
            source,
        })?;
        self.write_record(&mix)?;
        Ok(mix)
    }

    /// Rewrite only the record, leaving the audio untouched.
    pub fn save_record(&self, mix: &Mix) -> Result<(), MixStoreError> {
        self.write_record(mix)
    }

    /// Replace a previously saved mix, possibly under a new id. The old
    /// files (and any backup folder) go away first.
    pub fn resave(&self, old_id: &str, mix: &Mix, wav: &[u8]) -> Result<Mix, MixStoreError> {
        if old_id != mix.id {
            self.delete(old_id)?;
        }
        self.save(mix, wav)
    }

    /// Every stored mix, newest first. Unreadable records are skipped.
    pub fn list(&self) -> Result<Vec<Mix>, MixStoreError> {
        let dir = self.layout.mixes_dir()?;
        let entries = std::fs::read_dir(&dir).map_err(|source| MixStoreError::Io {
            path: dir.clone(),
            source,
        })?;
        let mut mixes = Vec::new();
        for entry in entries.filter_map(|entry| entry.ok()) {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match read_record(&path) {
                Ok(mix) => mixes.push(mix),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Skipping unreadable mix record");
                }
            }
        }
        mixes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(mixes)
    }

    /// Load one mix by id, falling back through the resolver chain for
    /// records written under legacy names.
    pub fn load(&self, id_or_name: &str) -> Result<Mix, MixStoreError> {
        let dir = self.layout.mixes_dir()?;
        let path = resolver::resolve_record(&dir, id_or_name)
            .ok_or_else(|| MixStoreError::NotFound(id_or_name.to_string()))?;
        read_record(&path)
    }

    /// Audio file for a stored mix, resolved like [`Self::load`].
    pub fn wav_path(&self, mix: &Mix) -> Result<PathBuf, MixStoreError> {
        let dir = self.layout.mixes_dir()?;
        resolver::resolve_audio(&dir, &mix.id)
            .or_else(|| resolver::resolve_audio(&dir, &mix.name))
            .ok_or_else(|| MixStoreError::NotFound(mix.id.clone()))
    }

    /// Rename a stored mix, keeping id and audio.
    pub fn rename(&self, id: &str, new_name: &str) -> Result<Mix, MixStoreError> {
        let mut mix = self.load(id)?;
        mix.name = new_name.to_string();
        self.write_record(&mix)?;
        Ok(mix)
    }

    /// Remove a mix's files and any backup folder keyed by the same id.
    /// Already-absent files are not an error.
    pub fn delete(&self, id: &str) -> Result<(), MixStoreError> {
        let dir = self.layout.mixes_dir()?;
        for path in [
            resolver::resolve_record(&dir, id),
            resolver::resolve_audio(&dir, id),
        ]
        .into_iter()
        .flatten()
        {
            std::fs::remove_file(&path)
                .map_err(|source| MixStoreError::Io { path, source })?;
        }
        let backup = self.layout.backups_dir()?.join(id);
        if backup.is_dir() {
            std::fs::remove_dir_all(&backup).map_err(|source| MixStoreError::Io {
                path: backup,
                source,
            })?;
        }
        Ok(())
    }

    fn write_record(&self, mix: &Mix) -> Result<(), MixStoreError> {
        let path = self.layout.mixes_dir()?.join(format!("{}.json", mix.id));
        let json = serde_json::to_string_pretty(mix).map_err(|source| MixStoreError::Json {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, json).map_err(|source| MixStoreError::Io { path, source })
    }
}

fn read_record(path: &Path) -> Result<Mix, MixStoreError> {
    let text = std::fs::read_to_string(path).map_err(|source| MixStoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| MixStoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn clip_ref(id: &str) -> ClipRef {
        ClipRef {
            id: id.into(),
            name: format!("clip {id}"),
            start: 0.0,
            duration: 60.0,
            song_name: "Song".into(),
            clip_path: None,
        }
    }

    #[test]
    fn cap_rejects_the_sixty_first_clip() {
        let mut mix = Mix::new("Party");
        for idx in 0..MAX_CLIPS {
            assert!(mix.push_clip(clip_ref(&idx.to_string())));
        }
        assert!(!mix.push_clip(clip_ref("one too many")));
        assert_eq!(mix.clips.len(), MAX_CLIPS);
    }

    #[test]
    fn save_list_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = MixStore::new(StorageLayout::at(dir.path()));
        let mut mix = Mix::new("Road Trip");
        mix.push_clip(clip_ref("c1"));
        let saved = store.save(&mix, b"RIFFaudio").unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], saved);

        let loaded = store.load(&mix.id).unwrap();
        assert_eq!(loaded.name, "Road Trip");
        assert!(store.wav_path(&loaded).unwrap().is_file());
    }

    #[test]
    fn load_falls_back_to_legacy_name_keyed_files() {
        let dir = tempdir().unwrap();
        let store = MixStore::new(StorageLayout::at(dir.path()));
        let mix = Mix::new("Legacy Mix");
        // Simulate an old installation that keyed files by name.
        let mixes = StorageLayout::at(dir.path()).mixes_dir().unwrap();
        std::fs::write(
            mixes.join("Legacy Mix.json"),
            serde_json::to_string(&mix).unwrap(),
        )
        .unwrap();

        let loaded = store.load(&mix.id).unwrap();
        assert_eq!(loaded.id, mix.id);
    }

    #[test]
    fn rename_keeps_id_and_audio() {
        let dir = tempdir().unwrap();
        let store = MixStore::new(StorageLayout::at(dir.path()));
        let mix = store.save(&Mix::new("Before"), b"wav").unwrap();
        let renamed = store.rename(&mix.id, "After").unwrap();
        assert_eq!(renamed.id, mix.id);
        assert_eq!(store.load(&mix.id).unwrap().name, "After");
    }

    #[test]
    fn delete_removes_files_and_backup_folder() {
        let dir = tempdir().unwrap();
        let layout = StorageLayout::at(dir.path());
        let store = MixStore::new(layout.clone());
        let mix = store.save(&Mix::new("Doomed"), b"wav").unwrap();
        let backup = layout.backup_dir_for(&mix.id).unwrap();
        std::fs::write(backup.join("original.mp3"), b"src").unwrap();

        store.delete(&mix.id).unwrap();
        assert!(store.load(&mix.id).is_err());
        assert!(!backup.exists());
    }

    #[test]
    fn resave_under_new_id_removes_old_files() {
        let dir = tempdir().unwrap();
        let store = MixStore::new(StorageLayout::at(dir.path()));
        let original = store.save(&Mix::new("Take 1"), b"wav-1").unwrap();
        let mut edited = original.clone();
        edited.id = Uuid::new_v4().to_string();
        edited.name = "Take 2".into();
        store.resave(&original.id, &edited, b"wav-2").unwrap();

        assert!(store.load(&original.id).is_err() || original.id == edited.id);
        assert_eq!(store.list().unwrap().len(), 1);
        assert_eq!(store.load(&edited.id).unwrap().name, "Take 2");
    }
}

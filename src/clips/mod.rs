use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::app_dirs::{AppDirError, StorageLayout};

pub mod extract;

pub use extract::{ExtractError, ExtractedClip, extract, extract_wild_cards};

/// A rendered audio segment cut from a source song.
///
/// The audio itself lives next to this record on disk as `{id}.wav`; the
/// record is the `{id}.json` sidecar. Unknown JSON fields survive round
/// trips through `extensions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: String,
    pub name: String,
    pub source_song_name: String,
    /// Offset into the source song, in seconds.
    pub start: f64,
    /// Clip length in seconds, already clamped to the source length.
    pub duration: f64,
    /// Absolute location of the clip audio, when pinned to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, String>,
}

/// Errors from the clip stores.
#[derive(Debug, Error)]
pub enum ClipStoreError {
    #[error(transparent)]
    AppDir(#[from] AppDirError),
    #[error("Clip file operation failed for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Clip sidecar {path} could not be encoded or parsed: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// On-disk clip storage: working clips in `temp_clips/`, kept clips under
/// `clips/{id}/`.
#[derive(Debug, Clone)]
pub struct ClipStore {
    layout: StorageLayout,
}

impl ClipStore {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// Persist a freshly extracted clip into the working store.
    pub fn save_temp(&self, clip: &Clip, wav: &[u8]) -> Result<(), ClipStoreError> {
        let dir = self.layout.temp_clips_dir()?;
        write_pair(&dir, &clip.id, clip, wav)
    }

    /// Persist a clip into its permanent per-clip folder.
    pub fn save_permanent(&self, clip: &Clip, wav: &[u8]) -> Result<(), ClipStoreError> {
        let dir = self.layout.clip_dir_for(&clip.id)?;
        write_pair(&dir, &clip.id, clip, wav)
    }

    /// Every clip in the working store. Unparseable sidecars are skipped
    /// with a warning.
    pub fn list_temp(&self) -> Result<Vec<Clip>, ClipStoreError> {
        let dir = self.layout.temp_clips_dir()?;
        let mut clips = Vec::new();
        let entries = std::fs::read_dir(&dir).map_err(|source| ClipStoreError::Io {
            path: dir.clone(),
            source,
        })?;
        for entry in entries.filter_map(|entry| entry.ok()) {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match read_sidecar(&path) {
                Ok(clip) => clips.push(clip),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Skipping unreadable clip sidecar");
                }
            }
        }
        clips.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clips)
    }

    /// Audio file location for a clip id: working store first, then the
    /// permanent folder. `None` when neither exists.
    pub fn resolve_wav(&self, clip_id: &str) -> Result<Option<PathBuf>, ClipStoreError> {
        let temp = self.layout.temp_clips_dir()?.join(format!("{clip_id}.wav"));
        if temp.is_file() {
            return Ok(Some(temp));
        }
        let permanent = self
            .layout
            .clips_dir()?
            .join(clip_id)
            .join(format!("{clip_id}.wav"));
        if permanent.is_file() {
            return Ok(Some(permanent));
        }
        Ok(None)
    }

    /// Canonical permanent location for a clip id, whether or not the file
    /// exists yet.
    pub fn permanent_wav_path(&self, clip_id: &str) -> Result<PathBuf, ClipStoreError> {
        Ok(self
            .layout
            .clips_dir()?
            .join(clip_id)
            .join(format!("{clip_id}.wav")))
    }

    /// Delete a clip everywhere it may live. Missing files are fine.
    pub fn delete(&self, clip_id: &str) -> Result<(), ClipStoreError> {
        let temp_dir = self.layout.temp_clips_dir()?;
        for name in [format!("{clip_id}.wav"), format!("{clip_id}.json")] {
            let path = temp_dir.join(name);
            if path.exists() {
                std::fs::remove_file(&path)
                    .map_err(|source| ClipStoreError::Io { path, source })?;
            }
        }
        let permanent = self.layout.clips_dir()?.join(clip_id);
        if permanent.is_dir() {
            std::fs::remove_dir_all(&permanent).map_err(|source| ClipStoreError::Io {
                path: permanent,
                source,
            })?;
        }
        Ok(())
    }

    /// Empty the working store.
    pub fn delete_all_temp(&self) -> Result<(), ClipStoreError> {
        for clip in self.list_temp()? {
            self.delete(&clip.id)?;
        }
        Ok(())
    }
}

fn write_pair(dir: &Path, id: &str, clip: &Clip, wav: &[u8]) -> Result<(), ClipStoreError> {
    let wav_path = dir.join(format!("{id}.wav"));
    std::fs::write(&wav_path, wav).map_err(|source| ClipStoreError::Io {
        path: wav_path,
        source,
    })?;
    let sidecar_path = dir.join(format!("{id}.json"));
    let json = serde_json::to_string_pretty(clip).map_err(|source| ClipStoreError::Json {
        path: sidecar_path.clone(),
        source,
    })?;
    std::fs::write(&sidecar_path, json).map_err(|source| ClipStoreError::Io {
        path: sidecar_path,
        source,
    })
}

fn read_sidecar(path: &Path) -> Result<Clip, ClipStoreError> {
    let text = std::fs::read_to_string(path).map_err(|source| ClipStoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ClipStoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn clip(id: &str, name: &str) -> Clip {
        Clip {
            id: id.into(),
            name: name.into(),
            source_song_name: "Song".into(),
            start: 1.0,
            duration: 2.0,
            clip_path: None,
            extensions: BTreeMap::new(),
        }
    }

    #[test]
    fn temp_save_list_delete_round_trip() {
        let dir = tempdir().unwrap();
        let store = ClipStore::new(StorageLayout::at(dir.path()));
        store.save_temp(&clip("c1", "B clip"), b"RIFFwav").unwrap();
        store.save_temp(&clip("c2", "A clip"), b"RIFFwav").unwrap();

        let listed = store.list_temp().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "A clip");

        assert!(store.resolve_wav("c1").unwrap().is_some());
        store.delete("c1").unwrap();
        assert!(store.resolve_wav("c1").unwrap().is_none());
        assert_eq!(store.list_temp().unwrap().len(), 1);
    }

    #[test]
    fn resolve_prefers_temp_then_permanent() {
        let dir = tempdir().unwrap();
        let store = ClipStore::new(StorageLayout::at(dir.path()));
        store.save_permanent(&clip("keep", "Kept"), b"wav").unwrap();
        let resolved = store.resolve_wav("keep").unwrap().unwrap();
        assert!(resolved.ends_with("clips/keep/keep.wav"));
    }

    #[test]
    fn unknown_sidecar_fields_survive_round_trip() {
        let json = r#"{
            "id": "x1",
            "name": "Clip",
            "sourceSongName": "Song",
            "start": 0.0,
            "duration": 5.0,
            "extensions": {"color": "red"}
        }"#;
        let parsed: Clip = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.extensions.get("color").map(String::as_str), Some("red"));
        let rewritten = serde_json::to_string(&parsed).unwrap();
        assert!(rewritten.contains("\"color\""));
    }
}

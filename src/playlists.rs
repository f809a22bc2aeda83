//! Playlists: reusable ordered clip lists, rendered on demand rather than
//! pre-rendered like a mix.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::app_dirs::{AppDirError, StorageLayout};
use crate::mixes::{ClipRef, MAX_CLIPS, now_rfc3339};

/// Export bookkeeping embedded in an exported playlist record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistExportInfo {
    pub exported_at: String,
    pub total_clips: usize,
    pub valid_clips: usize,
}

/// Import bookkeeping recorded when a playlist archive is brought in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistImportInfo {
    pub imported_at: String,
    pub total_clips: usize,
    pub valid_clips: usize,
    pub source_file: String,
}

/// A named, reusable, ordered list of clip references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub created_at: String,
    #[serde(default)]
    pub clips: Vec<ClipRef>,
    /// Interstitial sound this playlist renders with, if configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drinking_sound_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_info: Option<PlaylistExportInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_info: Option<PlaylistImportInfo>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, String>,
}

impl Playlist {
    /// Fresh playlist with a new id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            created_at: now_rfc3339(),
            clips: Vec::new(),
            drinking_sound_path: None,
            export_info: None,
            import_info: None,
            extensions: BTreeMap::new(),
        }
    }

    /// Append a clip reference, refusing once the cap is reached.
    /// Returns whether the clip was added.
    pub fn push_clip(&mut self, clip: ClipRef) -> bool {
        if self.clips.len() >= MAX_CLIPS {
            warn!(playlist = %self.name, "Clip cap of {MAX_CLIPS} reached; ignoring additional clip");
            return false;
        }
        self.clips.push(clip);
        true
    }
}

/// Errors from the playlist store.
#[derive(Debug, Error)]
pub enum PlaylistStoreError {
    #[error(transparent)]
    AppDir(#[from] AppDirError),
    #[error("Playlist file operation failed for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Playlist record {path} could not be encoded or parsed: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("No playlist found for '{0}'")]
    NotFound(String),
}

/// On-disk store for playlists: `playlists/{id}.json` plus an optional
/// `{id}_assets/` folder for copied interstitial sounds.
#[derive(Debug, Clone)]
pub struct PlaylistStore {
    layout: StorageLayout,
}

impl PlaylistStore {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// Write (or overwrite) a playlist record, truncating past the clip cap.
    pub fn save(&self, playlist: &Playlist) -> Result<Playlist, PlaylistStoreError> {
        let mut playlist = playlist.clone();
        if playlist.clips.len() > MAX_CLIPS {
            warn!(
                playlist = %playlist.name,
                dropped = playlist.clips.len() - MAX_CLIPS,
                "Truncating playlist to the clip cap"
            );
            playlist.clips.truncate(MAX_CLIPS);
        }
        let path = self.record_path(&playlist.id)?;
        let json =
            serde_json::to_string_pretty(&playlist).map_err(|source| PlaylistStoreError::Json {
                path: path.clone(),
                source,
            })?;
        std::fs::write(&path, json)
            .map_err(|source| PlaylistStoreError::Io { path, source })?;
        Ok(playlist)
    }

    /// Load one playlist by id.
    pub fn load(&self, id: &str) -> Result<Playlist, PlaylistStoreError> {
        let path = self.record_path(id)?;
        if !path.is_file() {
            return Err(PlaylistStoreError::NotFound(id.to_string()));
        }
        read_record(&path)
    }

    /// Every stored playlist, newest first. Unreadable records are skipped.
    pub fn list(&self) -> Result<Vec<Playlist>, PlaylistStoreError> {
        let dir = self.layout.playlists_dir()?;
        let entries = std::fs::read_dir(&dir).map_err(|source| PlaylistStoreError::Io {
            path: dir.clone(),
            source,
        })?;
        let mut playlists = Vec::new();
        for entry in entries.filter_map(|entry| entry.ok()) {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match read_record(&path) {
                Ok(playlist) => playlists.push(playlist),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Skipping unreadable playlist record");
                }
            }
        }
        playlists.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(playlists)
    }

    /// Remove a playlist record and its asset folder.
    pub fn delete(&self, id: &str) -> Result<(), PlaylistStoreError> {
        let path = self.record_path(id)?;
        if path.is_file() {
            std::fs::remove_file(&path)
                .map_err(|source| PlaylistStoreError::Io { path, source })?;
        }
        let assets = self.layout.playlists_dir()?.join(format!("{id}_assets"));
        if assets.is_dir() {
            std::fs::remove_dir_all(&assets).map_err(|source| PlaylistStoreError::Io {
                path: assets,
                source,
            })?;
        }
        Ok(())
    }

    fn record_path(&self, id: &str) -> Result<PathBuf, PlaylistStoreError> {
        Ok(self.layout.playlists_dir()?.join(format!("{id}.json")))
    }
}

fn read_record(path: &Path) -> Result<Playlist, PlaylistStoreError> {
    let text = std::fs::read_to_string(path).map_err(|source| PlaylistStoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| PlaylistStoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

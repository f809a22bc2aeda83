//! Application storage layout anchored to a single `.powerhour` folder.
//!
//! The default root lives under the OS config directory (e.g. `%APPDATA%` on
//! Windows); a `POWERHOUR_CONFIG_HOME` override exists for tests and portable
//! setups. All stores resolve their folders through a [`StorageLayout`] so a
//! test can point the entire pipeline at a temporary directory.

use std::{
    path::{Path, PathBuf},
    sync::{LazyLock, Mutex},
};

use directories::BaseDirs;
use thiserror::Error;

/// Name of the application directory that lives under the OS config root.
pub const APP_DIR_NAME: &str = ".powerhour";

static CONFIG_BASE_OVERRIDE: LazyLock<Mutex<Option<PathBuf>>> = LazyLock::new(|| Mutex::new(None));

/// Errors that can occur while resolving or preparing application directories.
#[derive(Debug, Error)]
pub enum AppDirError {
    /// No suitable base config directory could be resolved.
    #[error("No suitable base config directory available for application files")]
    NoBaseDir,
    /// Failed to create a directory under the application root.
    #[error("Failed to create application directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Return the default `.powerhour` root, creating it if needed.
pub fn app_root_dir() -> Result<PathBuf, AppDirError> {
    let base = config_base_dir().ok_or(AppDirError::NoBaseDir)?;
    let path = base.join(APP_DIR_NAME);
    ensure_dir(&path)?;
    Ok(path)
}

/// Resolved folder set for one application root.
///
/// Every accessor creates the folder on first use so callers never have to
/// pre-create the layout.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    /// Layout under the default application root.
    pub fn open_default() -> Result<Self, AppDirError> {
        Ok(Self::at(app_root_dir()?))
    }

    /// Layout rooted at an explicit directory.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root folder this layout resolves against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rendered mixes: `mixes/{id}.wav` + `{id}.json`.
    pub fn mixes_dir(&self) -> Result<PathBuf, AppDirError> {
        self.ensure("mixes")
    }

    /// Per-mix backups of original source files: `backups/{mixId}/**`.
    pub fn backups_dir(&self) -> Result<PathBuf, AppDirError> {
        self.ensure("backups")
    }

    /// Backup folder for one mix id.
    pub fn backup_dir_for(&self, mix_id: &str) -> Result<PathBuf, AppDirError> {
        let path = self.backups_dir()?.join(mix_id);
        ensure_dir(&path)?;
        Ok(path)
    }

    /// Working clips awaiting a mix: `temp_clips/{clipId}.wav` + `.json`.
    pub fn temp_clips_dir(&self) -> Result<PathBuf, AppDirError> {
        self.ensure("temp_clips")
    }

    /// Downloaded or staged source songs: `temp_songs/{songId}{ext}` + `.json`.
    pub fn temp_songs_dir(&self) -> Result<PathBuf, AppDirError> {
        self.ensure("temp_songs")
    }

    /// Permanent clip storage: `clips/{clipId}/{clipId}.wav` + `.json`.
    pub fn clips_dir(&self) -> Result<PathBuf, AppDirError> {
        self.ensure("clips")
    }

    /// Folder for one permanently stored clip id.
    pub fn clip_dir_for(&self, clip_id: &str) -> Result<PathBuf, AppDirError> {
        let path = self.clips_dir()?.join(clip_id);
        ensure_dir(&path)?;
        Ok(path)
    }

    /// Playlist definitions: `playlists/{playlistId}.json`.
    pub fn playlists_dir(&self) -> Result<PathBuf, AppDirError> {
        self.ensure("playlists")
    }

    /// Asset folder owned by one playlist (interstitial sound copies).
    pub fn playlist_assets_dir(&self, playlist_id: &str) -> Result<PathBuf, AppDirError> {
        let path = self.playlists_dir()?.join(format!("{playlist_id}_assets"));
        ensure_dir(&path)?;
        Ok(path)
    }

    /// Log files.
    pub fn logs_dir(&self) -> Result<PathBuf, AppDirError> {
        self.ensure("logs")
    }

    /// Location of the library database file.
    pub fn library_db_path(&self) -> Result<PathBuf, AppDirError> {
        ensure_dir(&self.root)?;
        Ok(self.root.join("library.db"))
    }

    /// Location of the settings file.
    pub fn config_path(&self) -> Result<PathBuf, AppDirError> {
        ensure_dir(&self.root)?;
        Ok(self.root.join("config.toml"))
    }

    fn ensure(&self, name: &str) -> Result<PathBuf, AppDirError> {
        let path = self.root.join(name);
        ensure_dir(&path)?;
        Ok(path)
    }
}

fn ensure_dir(path: &Path) -> Result<(), AppDirError> {
    std::fs::create_dir_all(path).map_err(|source| AppDirError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

fn config_base_dir() -> Option<PathBuf> {
    if let Some(path) = CONFIG_BASE_OVERRIDE
        .lock()
        .ok()
        .and_then(|guard| guard.clone())
    {
        return Some(path);
    }
    if let Ok(path) = std::env::var("POWERHOUR_CONFIG_HOME") {
        return Some(PathBuf::from(path));
    }
    BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Scoped override of the config base directory for tests.
#[cfg(test)]
pub(crate) struct ConfigBaseGuard;

#[cfg(test)]
impl ConfigBaseGuard {
    pub(crate) fn set(path: PathBuf) -> Self {
        let mut guard = CONFIG_BASE_OVERRIDE
            .lock()
            .expect("config base override mutex poisoned");
        *guard = Some(path);
        Self
    }
}

#[cfg(test)]
impl Drop for ConfigBaseGuard {
    fn drop(&mut self) {
        let mut guard = CONFIG_BASE_OVERRIDE
            .lock()
            .expect("config base override mutex poisoned");
        *guard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn uses_override_for_root_dir() {
        let base = tempdir().unwrap();
        let _guard = ConfigBaseGuard::set(base.path().to_path_buf());
        let root = app_root_dir().unwrap();
        assert_eq!(root, base.path().join(APP_DIR_NAME));
        assert!(root.is_dir());
    }

    #[test]
    fn layout_creates_folders_on_demand() {
        let base = tempdir().unwrap();
        let layout = StorageLayout::at(base.path());
        let mixes = layout.mixes_dir().unwrap();
        assert!(mixes.is_dir());
        assert_eq!(mixes, base.path().join("mixes"));

        let clip_dir = layout.clip_dir_for("abc").unwrap();
        assert_eq!(clip_dir, base.path().join("clips").join("abc"));
        assert!(clip_dir.is_dir());

        let assets = layout.playlist_assets_dir("p1").unwrap();
        assert_eq!(assets, base.path().join("playlists").join("p1_assets"));
    }
}

//! Application settings stored as a TOML file under the storage root.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs::StorageLayout;

/// Default library refresh interval in days.
pub const DEFAULT_CACHE_EXPIRY_DAYS: u32 = 7;
/// Default byte budget for cached song lists in the library store.
pub const DEFAULT_LIBRARY_QUOTA_BYTES: u64 = 5 * 1024 * 1024;
/// Default offline render rate in Hz.
pub const DEFAULT_RENDER_SAMPLE_RATE: u32 = 44_100;

const MIN_RENDER_SAMPLE_RATE: u32 = 8_000;
const MAX_RENDER_SAMPLE_RATE: u32 = 192_000;

/// Errors returned when reading or writing the settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings directory could not be resolved or created.
    #[error(transparent)]
    AppDir(#[from] crate::app_dirs::AppDirError),
    /// The settings file could not be read.
    #[error("Could not read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The settings file could not be written.
    #[error("Could not write settings file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The settings file did not parse as TOML.
    #[error("Could not parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// The settings could not be serialized.
    #[error("Could not serialize settings for {path}: {source}")]
    Serialize {
        path: PathBuf,
        source: toml::ser::Error,
    },
}

/// User-adjustable settings for the core pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Days before a cached library song list is considered stale.
    pub cache_expiry_days: u32,
    /// Byte budget for cached song lists before eviction kicks in.
    pub library_quota_bytes: u64,
    /// Sample rate of the offline render context.
    pub render_sample_rate: u32,
    /// Configured interstitial ("drinking") sound file, if any.
    pub drinking_sound_path: Option<PathBuf>,
    /// Explicit path to the external encoder binary for compressed exports.
    pub encoder_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_expiry_days: DEFAULT_CACHE_EXPIRY_DAYS,
            library_quota_bytes: DEFAULT_LIBRARY_QUOTA_BYTES,
            render_sample_rate: DEFAULT_RENDER_SAMPLE_RATE,
            drinking_sound_path: None,
            encoder_path: None,
        }
    }
}

impl AppConfig {
    /// Clamp out-of-range values loaded from disk back into supported bounds.
    fn normalized(mut self) -> Self {
        self.render_sample_rate = self
            .render_sample_rate
            .clamp(MIN_RENDER_SAMPLE_RATE, MAX_RENDER_SAMPLE_RATE);
        if self.cache_expiry_days == 0 {
            self.cache_expiry_days = DEFAULT_CACHE_EXPIRY_DAYS;
        }
        self
    }
}

/// Load settings from the layout's config file, returning defaults if missing.
pub fn load_or_default(layout: &StorageLayout) -> Result<AppConfig, ConfigError> {
    load_from(&layout.config_path()?)
}

/// Load settings from an explicit path, returning defaults if missing.
pub fn load_from(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str::<AppConfig>(&text)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
        .map(AppConfig::normalized)
}

/// Persist settings to the layout's config file, overwriting previous contents.
pub fn save(layout: &StorageLayout, config: &AppConfig) -> Result<(), ConfigError> {
    save_to_path(config, &layout.config_path()?)
}

/// Save settings to a specific path, creating parent directories as needed.
pub fn save_to_path(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let text = toml::to_string_pretty(config).map_err(|source| ConfigError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, text).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

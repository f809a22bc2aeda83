use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub mod metadata;
pub mod scanner;
pub mod store;

pub use metadata::{MetadataCache, TagMetadata, fingerprint};
pub use scanner::{ScanError, ScanHandle, ScanProgress, scan};
pub use store::{LibraryRecord, LibraryStore, StoreError, StoreOptions};

/// An audio file discovered during a library scan.
///
/// Identity is the absolute file path; freshness is tracked by the
/// `(path, mod time, size)` fingerprint, not stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    pub path: PathBuf,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    /// File size in bytes at scan time.
    #[serde(default)]
    pub size: u64,
}

impl AssetRecord {
    /// Record for a file with no extracted tags.
    pub fn untagged(path: PathBuf, display_name: String, size: u64) -> Self {
        Self {
            path,
            display_name,
            title: None,
            artist: None,
            album: None,
            genre: None,
            year: None,
            size,
        }
    }

    /// Apply extracted tag metadata to this record.
    pub fn with_tags(mut self, tags: &TagMetadata) -> Self {
        self.title = tags.title.clone();
        self.artist = tags.artist.clone();
        self.album = tags.album.clone();
        self.genre = tags.genre.clone();
        self.year = tags.year;
        self
    }
}

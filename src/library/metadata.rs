//! Tag metadata extraction and the session-lifetime fingerprint cache.
//!
//! The cache fronts the (comparatively slow) tag probe: entries are keyed by
//! a `(path, mod time, size)` fingerprint so any file change invalidates the
//! cached tags without an explicit flush.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::{Duration, Instant, UNIX_EPOCH},
};

use lofty::file::TaggedFileExt;
use lofty::prelude::*;
use thiserror::Error;

/// How long cached tag metadata stays valid.
pub const METADATA_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Tags extracted from an audio file. All fields optional; files without
/// usable tags yield the default value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<u32>,
}

/// Errors from the tag probe.
#[derive(Debug, Error)]
pub enum TagReadError {
    #[error("Failed to read tags from {path}: {source}")]
    Read {
        path: PathBuf,
        source: lofty::error::LoftyError,
    },
}

/// Read tag metadata from an audio file.
///
/// Files carrying no tag block at all are not an error; they produce an
/// empty [`TagMetadata`].
pub fn extract_tags(path: &Path) -> Result<TagMetadata, TagReadError> {
    let tagged = lofty::read_from_path(path).map_err(|source| TagReadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) else {
        return Ok(TagMetadata::default());
    };
    Ok(TagMetadata {
        title: non_empty(tag.title()),
        artist: non_empty(tag.artist()),
        album: non_empty(tag.album()),
        genre: non_empty(tag.genre()),
        year: tag.year(),
    })
}

fn non_empty(value: Option<std::borrow::Cow<'_, str>>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Cache invalidation key for one on-disk file state.
pub fn fingerprint(path: &Path) -> std::io::Result<String> {
    let meta = path.metadata()?;
    let mod_millis = meta
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0);
    Ok(fingerprint_from_parts(path, mod_millis, meta.len()))
}

/// Fingerprint from already-known file facts.
pub fn fingerprint_from_parts(path: &Path, mod_time_millis: u128, byte_size: u64) -> String {
    format!("{}:{mod_time_millis}:{byte_size}", path.display())
}

struct CacheEntry {
    tags: TagMetadata,
    captured_at: Instant,
}

/// In-memory tag cache with a fixed time-to-live per entry.
pub struct MetadataCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataCache {
    /// Cache with the standard 24h TTL.
    pub fn new() -> Self {
        Self::with_ttl(METADATA_TTL)
    }

    /// Cache with an explicit TTL (tests shorten this).
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Cached tags for a fingerprint, or `None` on miss.
    ///
    /// Expired entries are removed on access, so a miss here means the caller
    /// should re-extract and `put` the fresh result.
    pub fn get(&mut self, fingerprint: &str) -> Option<TagMetadata> {
        let entry = self.entries.get(fingerprint)?;
        if entry.captured_at.elapsed() > self.ttl {
            self.entries.remove(fingerprint);
            return None;
        }
        Some(entry.tags.clone())
    }

    /// Insert or overwrite the tags for a fingerprint.
    pub fn put(&mut self, fingerprint: String, tags: TagMetadata) {
        self.entries.insert(
            fingerprint,
            CacheEntry {
                tags,
                captured_at: Instant::now(),
            },
        );
    }

    /// Number of live entries (expired entries may still be counted until
    /// their next access).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every cached entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

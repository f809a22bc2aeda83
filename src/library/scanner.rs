//! Recursive library scan with progress reporting and cooperative
//! cancellation.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::UNIX_EPOCH,
};

use thiserror::Error;
use tracing::warn;

use super::metadata::{self, MetadataCache, TagMetadata};
use super::AssetRecord;

/// Extensions accepted by the scanner, lowercase without the dot.
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["mp3", "wav", "ogg", "m4a", "flac", "aac"];

/// How many processed files between progress callbacks.
const PROGRESS_INTERVAL: usize = 10;

/// True when the path carries a supported audio extension.
pub fn is_supported_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

/// Cancellation token for one scan. Cloning shares the flag, so a caller can
/// keep one end and hand the other to the scanning thread.
#[derive(Debug, Clone, Default)]
pub struct ScanHandle {
    cancelled: Arc<AtomicBool>,
}

impl ScanHandle {
    /// Fresh, uncancelled handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the scan holding this handle.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// True once `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Progress snapshot passed to the scan callback every few files.
#[derive(Debug, Clone, Copy)]
pub struct ScanProgress<'a> {
    pub processed: usize,
    pub current_file: &'a str,
}

/// Errors that can end a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Library root is not a directory: {0}")]
    InvalidRoot(PathBuf),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The scan was cancelled through its [`ScanHandle`]. Not a failure;
    /// callers must not report it as one.
    #[error("Scan cancelled")]
    Cancelled,
}

/// Recursively scan `root` for supported audio files.
///
/// Tag metadata is served from `cache` when the file fingerprint matches and
/// re-extracted otherwise; a file whose tags cannot be read still produces a
/// record with empty tags. An unreadable subdirectory is skipped with a
/// warning. Only an unreadable root or cancellation ends the scan early.
pub fn scan(
    root: &Path,
    cache: &mut MetadataCache,
    handle: &ScanHandle,
    mut on_progress: impl FnMut(ScanProgress<'_>),
) -> Result<Vec<AssetRecord>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::InvalidRoot(root.to_path_buf()));
    }
    let root = fs::canonicalize(root).map_err(|source| ScanError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    let mut records = Vec::new();
    let mut processed = 0usize;
    let mut stack = vec![root.clone()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(source) if dir != root => {
                warn!(
                    dir = %dir.display(),
                    error = %source,
                    "Failed to read directory during scan"
                );
                continue;
            }
            Err(source) => {
                return Err(ScanError::Io { path: dir, source });
            }
        };
        for entry_result in entries {
            if handle.is_cancelled() {
                return Err(ScanError::Cancelled);
            }
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(
                        dir = %dir.display(),
                        error = %err,
                        "Failed to read directory entry during scan"
                    );
                    continue;
                }
            };
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "Failed to read file type during scan"
                    );
                    continue;
                }
            };
            if file_type.is_symlink() {
                continue;
            }
            if file_type.is_dir() {
                stack.push(path);
                continue;
            }
            if file_type.is_file() && is_supported_audio(&path) {
                if let Some(record) = process_file(&path, cache) {
                    records.push(record);
                }
                processed += 1;
                if processed % PROGRESS_INTERVAL == 0 {
                    let name = file_name_for_display(&path);
                    on_progress(ScanProgress {
                        processed,
                        current_file: &name,
                    });
                }
            }
        }
    }
    Ok(records)
}

fn process_file(path: &Path, cache: &mut MetadataCache) -> Option<AssetRecord> {
    let meta = match path.metadata() {
        Ok(meta) => meta,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to stat file during scan");
            return None;
        }
    };
    let mod_millis = meta
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_millis())
        .unwrap_or(0);
    let key = metadata::fingerprint_from_parts(path, mod_millis, meta.len());

    let tags = match cache.get(&key) {
        Some(tags) => tags,
        None => {
            let tags = match metadata::extract_tags(path) {
                Ok(tags) => tags,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Tag extraction failed; continuing with empty tags");
                    TagMetadata::default()
                }
            };
            cache.put(key, tags.clone());
            tags
        }
    };

    let display_name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("unknown")
        .to_string();
    Some(AssetRecord::untagged(path.to_path_buf(), display_name, meta.len()).with_tags(&tags))
}

fn file_name_for_display(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("")
        .to_string()
}

//! Ordered fallback resolution for record and audio files.
//!
//! Old installations keyed mix files by display name instead of id, and
//! some filesystems changed filename case in transit. Rather than branch
//! inline at every call site, lookups walk a fixed chain and take the first
//! hit: exact path, then case-insensitive filename, then (for records) a
//! content scan matching each JSON file's `id`/`name` field.

use std::path::{Path, PathBuf};

use tracing::debug;

/// `dir/{stem}.{ext}` when it exists exactly as named.
pub fn by_exact_path(dir: &Path, stem: &str, ext: &str) -> Option<PathBuf> {
    let path = dir.join(format!("{stem}.{ext}"));
    path.is_file().then_some(path)
}

/// First file in `dir` whose name matches `{stem}.{ext}` ignoring ASCII case.
pub fn by_case_insensitive_name(dir: &Path, stem: &str, ext: &str) -> Option<PathBuf> {
    let wanted = format!("{stem}.{ext}");
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .find(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.eq_ignore_ascii_case(&wanted))
        })
}

/// First JSON file in `dir` whose `id` or `name` field equals `needle`.
pub fn by_record_content(dir: &Path, needle: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.filter_map(|entry| entry.ok()) {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let Ok(text) = std::fs::read_to_string(&path) else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
            continue;
        };
        let matches = ["id", "name"].iter().any(|field| {
            value
                .get(field)
                .and_then(|v| v.as_str())
                .is_some_and(|v| v == needle)
        });
        if matches {
            debug!(path = %path.display(), needle, "Resolved record by content scan");
            return Some(path);
        }
    }
    None
}

/// Resolve a JSON record for an id or name through the full chain.
pub fn resolve_record(dir: &Path, needle: &str) -> Option<PathBuf> {
    by_exact_path(dir, needle, "json")
        .or_else(|| by_case_insensitive_name(dir, needle, "json"))
        .or_else(|| by_record_content(dir, needle))
}

/// Resolve an audio file for an id or name (no content scan for binaries).
pub fn resolve_audio(dir: &Path, needle: &str) -> Option<PathBuf> {
    by_exact_path(dir, needle, "wav").or_else(|| by_case_insensitive_name(dir, needle, "wav"))
}

//! Bounded zip packing and extraction shared by both archive kinds.

use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use thiserror::Error;

const MAX_ZIP_ENTRIES: usize = 10_000;
const MAX_ZIP_ENTRY_UNCOMPRESSED_BYTES: u64 = 1024 * 1024 * 1024;
const MAX_ZIP_TOTAL_UNCOMPRESSED_BYTES: u64 = 4 * 1024 * 1024 * 1024;
// PCM silence deflates extremely well, so the ratio bound stays loose.
const MAX_ZIP_COMPRESSION_RATIO: u64 = 5_000;

/// Local-file-header signature every zip starts with.
const ZIP_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

/// Errors from zip packing and extraction.
#[derive(Debug, Error)]
pub enum ZipIoError {
    #[error("Zip file operation failed for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Zip archive error for {path}: {detail}")]
    Zip { path: PathBuf, detail: String },
    #[error("Archive exceeds extraction limits: {0}")]
    OverLimit(String),
}

/// True when the file begins with the 4-byte zip local-file-header
/// signature.
pub fn has_zip_signature(path: &Path) -> Result<bool, ZipIoError> {
    let mut file = File::open(path).map_err(|source| ZipIoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == ZIP_SIGNATURE),
        Err(_) => Ok(false),
    }
}

/// Zip every file under `src_dir` into `dest`, keeping relative paths.
pub fn zip_dir(src_dir: &Path, dest: &Path) -> Result<(), ZipIoError> {
    let file = File::create(dest).map_err(|source| ZipIoError::Io {
        path: dest.to_path_buf(),
        source,
    })?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let mut stack = vec![src_dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|source| ZipIoError::Io {
            path: dir.clone(),
            source,
        })?;
        for entry in entries.filter_map(|entry| entry.ok()) {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            let relative = path
                .strip_prefix(src_dir)
                .unwrap_or(&path)
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            zip.start_file(relative, options)
                .map_err(|err| zip_error(dest, err))?;
            let mut input = File::open(&path).map_err(|source| ZipIoError::Io {
                path: path.clone(),
                source,
            })?;
            std::io::copy(&mut input, &mut zip).map_err(|source| ZipIoError::Io {
                path: path.clone(),
                source,
            })?;
        }
    }
    zip.finish().map_err(|err| zip_error(dest, err))?;
    Ok(())
}

/// Extract an archive into `dest_dir` while enforcing entry-count, size, and
/// compression-ratio limits, ignoring entries that would escape the
/// destination.
pub fn unzip_to_dir(zip_path: &Path, dest_dir: &Path) -> Result<(), ZipIoError> {
    let file = File::open(zip_path).map_err(|source| ZipIoError::Io {
        path: zip_path.to_path_buf(),
        source,
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(|err| zip_error(zip_path, err))?;
    let entry_count = archive.len();
    if entry_count > MAX_ZIP_ENTRIES {
        return Err(ZipIoError::OverLimit(format!(
            "{entry_count} entries, limit is {MAX_ZIP_ENTRIES}"
        )));
    }

    let mut total_uncompressed: u64 = 0;
    for index in 0..entry_count {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| zip_error(zip_path, err))?;
        let uncompressed = entry.size();
        if uncompressed > MAX_ZIP_ENTRY_UNCOMPRESSED_BYTES {
            return Err(ZipIoError::OverLimit(format!(
                "entry '{}' is {uncompressed} bytes",
                entry.name()
            )));
        }
        if uncompressed > 0 {
            let compressed = entry.compressed_size().max(1);
            if uncompressed > compressed.saturating_mul(MAX_ZIP_COMPRESSION_RATIO) {
                return Err(ZipIoError::OverLimit(format!(
                    "entry '{}' exceeds the compression ratio bound",
                    entry.name()
                )));
            }
        }
        total_uncompressed = total_uncompressed.saturating_add(uncompressed);
        if total_uncompressed > MAX_ZIP_TOTAL_UNCOMPRESSED_BYTES {
            return Err(ZipIoError::OverLimit(format!(
                "archive expands past {MAX_ZIP_TOTAL_UNCOMPRESSED_BYTES} bytes"
            )));
        }

        let Some(enclosed) = entry.enclosed_name() else {
            continue;
        };
        let outpath = dest_dir.join(enclosed);
        if entry.name().ends_with('/') {
            std::fs::create_dir_all(&outpath).map_err(|source| ZipIoError::Io {
                path: outpath,
                source,
            })?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ZipIoError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let mut outfile = File::create(&outpath).map_err(|source| ZipIoError::Io {
            path: outpath.clone(),
            source,
        })?;
        std::io::copy(&mut entry, &mut outfile).map_err(|source| ZipIoError::Io {
            path: outpath,
            source,
        })?;
    }
    Ok(())
}

fn zip_error(path: &Path, err: impl std::fmt::Display) -> ZipIoError {
    ZipIoError::Zip {
        path: path.to_path_buf(),
        detail: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn zip_then_unzip_round_trips_a_tree() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("clips")).unwrap();
        std::fs::write(src.join("manifest.json"), b"{}").unwrap();
        std::fs::write(src.join("clips/one.wav"), b"RIFFdata").unwrap();

        let archive = dir.path().join("out.zip");
        zip_dir(&src, &archive).unwrap();
        assert!(has_zip_signature(&archive).unwrap());

        let out = dir.path().join("out");
        unzip_to_dir(&archive, &out).unwrap();
        assert_eq!(std::fs::read(out.join("manifest.json")).unwrap(), b"{}");
        assert_eq!(
            std::fs::read(out.join("clips/one.wav")).unwrap(),
            b"RIFFdata"
        );
    }

    #[test]
    fn non_zip_bytes_fail_the_signature_check() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fake.phpl");
        std::fs::write(&path, b"plain text, not a zip").unwrap();
        assert!(!has_zip_signature(&path).unwrap());
    }

    #[test]
    fn short_file_fails_the_signature_check() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tiny.phpl");
        std::fs::write(&path, b"PK").unwrap();
        assert!(!has_zip_signature(&path).unwrap());
    }

    #[test]
    fn traversal_entries_are_ignored_on_extract() {
        use std::io::Write;

        let dir = tempdir().unwrap();
        let archive = dir.path().join("evil.zip");
        let file = File::create(&archive).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        zip.start_file("../escape.txt", options).unwrap();
        zip.write_all(b"nope").unwrap();
        zip.start_file("fine.txt", options).unwrap();
        zip.write_all(b"ok").unwrap();
        zip.finish().unwrap();

        let out = dir.path().join("out");
        unzip_to_dir(&archive, &out).unwrap();
        assert!(out.join("fine.txt").is_file());
        assert!(!dir.path().join("escape.txt").exists());
    }
}

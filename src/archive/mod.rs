use std::path::PathBuf;

use thiserror::Error;

pub mod playlist;
pub mod project;
pub mod resolver;
pub mod zipio;

pub use playlist::{PLAYLIST_ARCHIVE_EXTENSION, export_playlist, import_playlist};
pub use project::{
    PROJECT_ARCHIVE_EXTENSION, PROJECT_MANIFEST_TYPE, ProjectManifest, export_project,
    import_project,
};

/// Version stamped into archive manifests written by this build.
pub const ARCHIVE_VERSION: u32 = 1;

/// Errors from archive packing and unpacking.
///
/// [`ArchiveError::InvalidArchive`] is the only fatal shape on import: the
/// container is not a zip, or a required manifest/record is missing or
/// malformed. Individually missing assets inside an otherwise valid archive
/// degrade the result instead of failing the operation.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Invalid archive: {0}")]
    InvalidArchive(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    AppDir(#[from] crate::app_dirs::AppDirError),
    #[error("Archive file operation failed for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Archive record {path} could not be encoded: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Zip(#[from] zipio::ZipIoError),
    #[error(transparent)]
    Clips(#[from] crate::clips::ClipStoreError),
    #[error(transparent)]
    Mixes(#[from] crate::mixes::MixStoreError),
    #[error(transparent)]
    Playlists(#[from] crate::playlists::PlaylistStoreError),
}

fn io_error(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> ArchiveError {
    let path = path.into();
    move |source| ArchiveError::Io { path, source }
}

/// Copy a directory tree, creating destination folders as needed.
fn copy_dir_recursive(src: &std::path::Path, dest: &std::path::Path) -> Result<(), ArchiveError> {
    std::fs::create_dir_all(dest).map_err(io_error(dest))?;
    let mut stack = vec![src.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = std::fs::read_dir(&dir).map_err(io_error(&dir))?;
        for entry in entries.filter_map(|entry| entry.ok()) {
            let path = entry.path();
            let relative = path.strip_prefix(src).unwrap_or(path.as_path());
            let target = dest.join(relative);
            if path.is_dir() {
                std::fs::create_dir_all(&target).map_err(io_error(&target))?;
                stack.push(path);
            } else {
                std::fs::copy(&path, &target).map_err(io_error(&path))?;
            }
        }
    }
    Ok(())
}

//! Composition root for the core pipeline.
//!
//! One [`CoreService`] per process owns the library store, metadata cache,
//! render context, and the clip/mix/playlist stores. Nothing in here is a
//! global: tests construct a service over a temporary layout and get a fully
//! isolated pipeline.

use std::path::Path;
use std::sync::Mutex;

use thiserror::Error;
use tracing::warn;

use crate::app_dirs::{AppDirError, StorageLayout};
use crate::archive::{self, ArchiveError, ProjectManifest};
use crate::audio::{
    self, ComposeError, EncodeExportError, EncodeSettings, OfflineRenderer, SampleBuffer, WavError,
};
use crate::clips::{Clip, ClipStore, ClipStoreError, ExtractError};
use crate::config::{AppConfig, ConfigError};
use crate::library::{
    AssetRecord, LibraryStore, MetadataCache, ScanError, ScanHandle, ScanProgress, StoreError,
    StoreOptions, TagMetadata, scanner,
};
use crate::mixes::{Mix, MixStore, MixStoreError};
use crate::playlists::{Playlist, PlaylistStore, PlaylistStoreError};

/// Umbrella error for the operation surface.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    AppDir(#[from] AppDirError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Clips(#[from] ClipStoreError),
    #[error(transparent)]
    Mixes(#[from] MixStoreError),
    #[error(transparent)]
    Playlists(#[from] PlaylistStoreError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Compose(#[from] ComposeError),
    #[error(transparent)]
    Wav(#[from] WavError),
    #[error(transparent)]
    Encode(#[from] EncodeExportError),
    /// Every requested clip id failed to resolve to an existing clip file.
    #[error("No valid clips to compose")]
    NoValidClips,
}

/// The core operation surface handed to UI shells.
pub struct CoreService {
    layout: StorageLayout,
    config: AppConfig,
    renderer: OfflineRenderer,
    library: LibraryStore,
    metadata_cache: Mutex<MetadataCache>,
    clips: ClipStore,
    mixes: MixStore,
    playlists: PlaylistStore,
}

impl CoreService {
    /// Service over the default application folder.
    pub fn open_default() -> Result<Self, ServiceError> {
        let layout = StorageLayout::open_default()?;
        let config = crate::config::load_or_default(&layout)?;
        Self::open(layout, config)
    }

    /// Service over an explicit layout and settings (tests use a tempdir).
    pub fn open(layout: StorageLayout, config: AppConfig) -> Result<Self, ServiceError> {
        let library = LibraryStore::open(
            &layout.library_db_path()?,
            StoreOptions {
                quota_bytes: config.library_quota_bytes,
                cache_expiry_days: config.cache_expiry_days,
            },
        )?;
        Ok(Self {
            renderer: OfflineRenderer::new(config.render_sample_rate),
            library,
            metadata_cache: Mutex::new(MetadataCache::new()),
            clips: ClipStore::new(layout.clone()),
            mixes: MixStore::new(layout.clone()),
            playlists: PlaylistStore::new(layout.clone()),
            layout,
            config,
        })
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn library(&self) -> &LibraryStore {
        &self.library
    }

    /// Scan a folder, cache the results as the current library, and return
    /// the songs. Cancellation goes through the handle the caller created;
    /// each scan gets its own handle, so starting another scan cannot
    /// invalidate this one's.
    pub fn scan_library(
        &self,
        root: &Path,
        handle: &ScanHandle,
        on_progress: impl FnMut(ScanProgress<'_>),
    ) -> Result<Vec<AssetRecord>, ServiceError> {
        let songs = {
            let mut cache = self
                .metadata_cache
                .lock()
                .expect("metadata cache mutex poisoned");
            scanner::scan(root, &mut cache, handle, on_progress)?
        };
        self.library.save_library(root, &songs, None, true)?;
        Ok(songs)
    }

    /// Cached songs for a folder, or `None` when a fresh scan is required.
    pub fn load_library(
        &self,
        root: &Path,
        make_current: bool,
    ) -> Result<Option<Vec<AssetRecord>>, ServiceError> {
        Ok(self.library.load_library(root, make_current)?)
    }

    pub fn needs_refresh(&self, root: &Path) -> Result<bool, ServiceError> {
        Ok(self.library.needs_refresh(root)?)
    }

    pub fn remove_library(&self, root: &Path) -> Result<(), ServiceError> {
        Ok(self.library.remove_library(root)?)
    }

    pub fn add_song_to_library(
        &self,
        root: &Path,
        song: &AssetRecord,
    ) -> Result<(), ServiceError> {
        Ok(self.library.add_song_to_library(root, song)?)
    }

    pub fn update_song_metadata(
        &self,
        root: &Path,
        song_path: &Path,
        patch: &TagMetadata,
    ) -> Result<(), ServiceError> {
        Ok(self.library.update_song_metadata(root, song_path, patch)?)
    }

    /// Cut a clip out of a source song and persist it to the working store.
    pub fn extract_clip(
        &self,
        asset: &AssetRecord,
        start_seconds: f64,
        duration_seconds: f64,
    ) -> Result<Clip, ServiceError> {
        let extracted =
            crate::clips::extract(&self.renderer, &asset.path, start_seconds, duration_seconds)?;
        self.clips.save_temp(&extracted.meta, &extracted.wav)?;
        Ok(extracted.meta)
    }

    /// One random window per selected song; failures skip that song.
    pub fn extract_wild_cards(&self, assets: &[AssetRecord]) -> Result<Vec<Clip>, ServiceError> {
        let mut saved = Vec::new();
        for extracted in crate::clips::extract_wild_cards(&self.renderer, assets) {
            match self.clips.save_temp(&extracted.meta, &extracted.wav) {
                Ok(()) => saved.push(extracted.meta),
                Err(err) => {
                    warn!(clip = %extracted.meta.id, error = %err, "Failed to persist wild card clip");
                }
            }
        }
        Ok(saved)
    }

    pub fn list_clips(&self) -> Result<Vec<Clip>, ServiceError> {
        Ok(self.clips.list_temp()?)
    }

    pub fn delete_clip(&self, clip_id: &str) -> Result<(), ServiceError> {
        Ok(self.clips.delete(clip_id)?)
    }

    pub fn delete_all_clips(&self) -> Result<(), ServiceError> {
        Ok(self.clips.delete_all_temp()?)
    }

    /// Render the ordered clips into one WAV byte stream, inserting the
    /// interstitial sound between consecutive clips.
    ///
    /// A clip id that no longer resolves to a file is skipped with a
    /// warning; only a fully empty result is an error.
    pub fn compose_mix(
        &self,
        clip_ids: &[String],
        interstitial: Option<&Path>,
    ) -> Result<Vec<u8>, ServiceError> {
        let mut buffers = Vec::new();
        for clip_id in clip_ids {
            match self.clip_buffer(clip_id) {
                Some(buffer) => buffers.push(buffer),
                None => {
                    warn!(clip = %clip_id, "Skipping invalid clip reference during composition");
                }
            }
        }
        if buffers.is_empty() {
            return Err(ServiceError::NoValidClips);
        }
        let interstitial_buffer = interstitial.and_then(|path| self.interstitial_buffer(path));
        let composite = audio::compose(&buffers, interstitial_buffer.as_ref())?;
        Ok(audio::encode_wav(&composite))
    }

    /// Compressed export of the same composition through the external
    /// encoder.
    pub fn export_mix_compressed(
        &self,
        clip_ids: &[String],
        interstitial: Option<&Path>,
        dest: &Path,
        settings: EncodeSettings,
    ) -> Result<(), ServiceError> {
        let mut buffers = Vec::new();
        for clip_id in clip_ids {
            match self.clip_buffer(clip_id) {
                Some(buffer) => buffers.push(buffer),
                None => warn!(clip = %clip_id, "Skipping invalid clip reference during export"),
            }
        }
        if buffers.is_empty() {
            return Err(ServiceError::NoValidClips);
        }
        let interstitial_buffer = interstitial.and_then(|path| self.interstitial_buffer(path));
        audio::export_compressed(
            &buffers,
            interstitial_buffer.as_ref(),
            dest,
            settings,
            self.config.encoder_path.as_deref(),
        )?;
        Ok(())
    }

    pub fn save_mix(&self, mix: &Mix, wav: &[u8]) -> Result<Mix, ServiceError> {
        Ok(self.mixes.save(mix, wav)?)
    }

    /// Replace an edited mix, deleting the files written under its old id.
    pub fn resave_mix(&self, old_id: &str, mix: &Mix, wav: &[u8]) -> Result<Mix, ServiceError> {
        Ok(self.mixes.resave(old_id, mix, wav)?)
    }

    pub fn list_mixes(&self) -> Result<Vec<Mix>, ServiceError> {
        Ok(self.mixes.list()?)
    }

    pub fn delete_mix(&self, mix_id: &str) -> Result<(), ServiceError> {
        Ok(self.mixes.delete(mix_id)?)
    }

    pub fn rename_mix(&self, mix_id: &str, new_name: &str) -> Result<Mix, ServiceError> {
        Ok(self.mixes.rename(mix_id, new_name)?)
    }

    pub fn update_mix_metadata(&self, mix: &Mix) -> Result<(), ServiceError> {
        Ok(self.mixes.save_record(mix)?)
    }

    pub fn save_playlist(&self, playlist: &Playlist) -> Result<Playlist, ServiceError> {
        Ok(self.playlists.save(playlist)?)
    }

    pub fn list_playlists(&self) -> Result<Vec<Playlist>, ServiceError> {
        Ok(self.playlists.list()?)
    }

    pub fn delete_playlist(&self, playlist_id: &str) -> Result<(), ServiceError> {
        Ok(self.playlists.delete(playlist_id)?)
    }

    pub fn export_project_archive(
        &self,
        mix_id: &str,
        dest: &Path,
    ) -> Result<ProjectManifest, ServiceError> {
        Ok(archive::export_project(
            &self.layout,
            &self.mixes,
            &self.clips,
            mix_id,
            dest,
            self.config.drinking_sound_path.as_deref(),
        )?)
    }

    pub fn import_project_archive(&self, archive_path: &Path) -> Result<Mix, ServiceError> {
        Ok(archive::import_project(
            &self.layout,
            &self.mixes,
            archive_path,
        )?)
    }

    pub fn export_playlist_archive(
        &self,
        playlist_id: &str,
        dest: &Path,
    ) -> Result<Playlist, ServiceError> {
        Ok(archive::export_playlist(
            &self.playlists,
            &self.clips,
            playlist_id,
            dest,
        )?)
    }

    pub fn import_playlist_archive(&self, archive_path: &Path) -> Result<Playlist, ServiceError> {
        Ok(archive::import_playlist(
            &self.layout,
            &self.playlists,
            archive_path,
        )?)
    }

    fn clip_buffer(&self, clip_id: &str) -> Option<SampleBuffer> {
        let path = match self.clips.resolve_wav(clip_id) {
            Ok(Some(path)) => path,
            Ok(None) => return None,
            Err(err) => {
                warn!(clip = %clip_id, error = %err, "Clip lookup failed");
                return None;
            }
        };
        match audio::read_wav(&path) {
            Ok(buffer) => Some(self.renderer.render(&buffer)),
            Err(err) => {
                warn!(clip = %clip_id, error = %err, "Clip audio unreadable");
                None
            }
        }
    }

    fn interstitial_buffer(&self, path: &Path) -> Option<SampleBuffer> {
        match audio::decode_file(path) {
            Ok(buffer) => Some(self.renderer.render(&buffer)),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Interstitial sound unreadable; composing without it");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_tone(path: &Path, seconds: f64, sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..(seconds * f64::from(sample_rate)) as usize {
            writer.write_sample(6_000i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn service_at(root: &Path) -> CoreService {
        let config = AppConfig {
            render_sample_rate: 8_000,
            ..AppConfig::default()
        };
        CoreService::open(StorageLayout::at(root.join("app")), config).unwrap()
    }

    #[test]
    fn scan_extract_compose_round_trip() {
        let dir = tempdir().unwrap();
        let music = dir.path().join("music");
        std::fs::create_dir_all(&music).unwrap();
        write_tone(&music.join("one.wav"), 3.0, 8_000);
        write_tone(&music.join("two.wav"), 2.0, 8_000);

        let service = service_at(dir.path());
        let songs = service
            .scan_library(&music, &ScanHandle::new(), |_| {})
            .unwrap();
        assert_eq!(songs.len(), 2);
        assert!(!service.needs_refresh(&music).unwrap());
        assert!(service.load_library(&music, false).unwrap().is_some());

        let clip_a = service.extract_clip(&songs[0], 0.0, 1.0).unwrap();
        let clip_b = service.extract_clip(&songs[1], 0.5, 1.0).unwrap();
        assert_eq!(service.list_clips().unwrap().len(), 2);

        let wav = service
            .compose_mix(&[clip_a.id.clone(), clip_b.id.clone()], None)
            .unwrap();
        let buffer = audio::read_wav_bytes(&wav).unwrap();
        assert!((buffer.duration_seconds() - 2.0).abs() < 0.01);
    }

    #[test]
    fn invalid_clip_references_are_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let music = dir.path().join("music");
        std::fs::create_dir_all(&music).unwrap();
        write_tone(&music.join("one.wav"), 2.0, 8_000);

        let service = service_at(dir.path());
        let songs = service
            .scan_library(&music, &ScanHandle::new(), |_| {})
            .unwrap();
        let clip = service.extract_clip(&songs[0], 0.0, 1.0).unwrap();

        let wav = service
            .compose_mix(&[clip.id.clone(), "no-such-clip".to_string()], None)
            .unwrap();
        assert!(!wav.is_empty());
    }

    #[test]
    fn composing_only_invalid_clips_is_an_error() {
        let dir = tempdir().unwrap();
        let service = service_at(dir.path());
        let err = service
            .compose_mix(&["ghost".to_string()], None)
            .unwrap_err();
        assert!(matches!(err, ServiceError::NoValidClips));
    }
}

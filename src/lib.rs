//! Library exports for the power hour core: media library scanning and
//! caching, clip extraction, mix composition, and the project/playlist
//! archive format. UI shells call through [`service::CoreService`].

/// Storage layout anchored to a single application folder.
pub mod app_dirs;
/// Project and playlist archive packing and unpacking.
pub mod archive;
/// Decoding, offline rendering, composition, and WAV encoding.
pub mod audio;
/// Extracted clip records and their on-disk stores.
pub mod clips;
/// TOML settings file.
pub mod config;
/// Library scanning, tag metadata caching, and persistence.
pub mod library;
/// Logging setup.
pub mod logging;
/// Rendered mix records and their on-disk store.
pub mod mixes;
/// Reusable, unrendered clip playlists.
pub mod playlists;
/// Composition root exposing the core operation surface.
pub mod service;

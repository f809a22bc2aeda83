//! Durable multi-library persistence with TTL-based refresh, quota
//! eviction, and one-time id migration.
//!
//! One SQLite database holds every scanned library: the cached song list as
//! JSON plus the aggregates derived from it. Records are replaced wholesale
//! on rescan; `song_count` and `total_size` are always recomputed from the
//! song list on write so they cannot drift.

use std::{
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
    time::{SystemTime, UNIX_EPOCH},
};

use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use super::AssetRecord;
use super::metadata::TagMetadata;

/// Schema version stamped on stored library records.
pub const LIBRARY_RECORD_VERSION: i64 = 2;

const CURRENT_LIBRARY_KEY: &str = "current_library_id";
/// Share of libraries evicted (oldest `last_scanned` first) when a write
/// would exceed the quota.
const EVICTION_FRACTION: f64 = 0.25;
const MILLIS_PER_DAY: i64 = 86_400_000;

/// Errors returned when operating on the library store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Library database query failed: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("Library record for {path} could not be encoded or parsed: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// The write would exceed the quota even after the eviction retry.
    #[error("Library store quota exceeded; write abandoned")]
    StorageFull,
}

/// Tuning knobs for the store, sourced from [`crate::config::AppConfig`].
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Byte budget over all cached song-list JSON.
    pub quota_bytes: u64,
    /// Days before `needs_refresh` reports a record stale.
    pub cache_expiry_days: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            quota_bytes: crate::config::DEFAULT_LIBRARY_QUOTA_BYTES,
            cache_expiry_days: crate::config::DEFAULT_CACHE_EXPIRY_DAYS,
        }
    }
}

/// One cached library.
#[derive(Debug, Clone)]
pub struct LibraryRecord {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub songs: Vec<AssetRecord>,
    pub last_scanned_ms: i64,
    pub song_count: usize,
    pub total_size: u64,
    pub version: i64,
}

/// SQLite-backed store for every scanned library.
///
/// All access funnels through one internal lock: each call is a whole-record
/// read-modify-write, which also serializes a scan saving results against a
/// concurrent removal of the same path.
pub struct LibraryStore {
    connection: Mutex<Connection>,
    options: StoreOptions,
}

impl LibraryStore {
    /// Open (or create) the store at the given database path.
    pub fn open(db_path: &Path, options: StoreOptions) -> Result<Self, StoreError> {
        let connection = Connection::open(db_path)?;
        Self::from_connection(connection, options)
    }

    /// In-memory store for tests.
    pub fn open_in_memory(options: StoreOptions) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?, options)
    }

    fn from_connection(connection: Connection, options: StoreOptions) -> Result<Self, StoreError> {
        connection.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout=5000;",
        )?;
        apply_schema(&connection)?;
        migrate_legacy_ids(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
            options,
        })
    }

    /// Store (or replace) the song list scanned for a folder.
    ///
    /// `name` defaults to the folder's file name. When the configured quota
    /// would be exceeded, the oldest quarter of libraries is evicted and the
    /// write retried once before giving up with [`StoreError::StorageFull`].
    pub fn save_library(
        &self,
        path: &Path,
        songs: &[AssetRecord],
        name: Option<&str>,
        make_current: bool,
    ) -> Result<LibraryRecord, StoreError> {
        let id = derive_library_id(path);
        let songs_json = serde_json::to_string(songs).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        let record = LibraryRecord {
            id: id.clone(),
            name: name
                .map(str::to_string)
                .unwrap_or_else(|| default_library_name(path)),
            path: path.to_path_buf(),
            songs: songs.to_vec(),
            last_scanned_ms: now_millis(),
            song_count: songs.len(),
            total_size: songs.iter().map(|song| song.size).sum(),
            version: LIBRARY_RECORD_VERSION,
        };

        let conn = self.lock();
        let incoming = songs_json.len() as u64;
        if self.stored_bytes_excluding(&conn, &id)? + incoming > self.options.quota_bytes {
            evict_oldest_quarter(&conn, &id)?;
            if self.stored_bytes_excluding(&conn, &id)? + incoming > self.options.quota_bytes {
                return Err(StoreError::StorageFull);
            }
        }
        upsert_record(&conn, &record, &songs_json)?;
        if make_current {
            set_metadata(&conn, CURRENT_LIBRARY_KEY, &id)?;
        }
        Ok(record)
    }

    /// Load the cached song list for a folder, or `None` when not cached.
    pub fn load_library(
        &self,
        path: &Path,
        make_current: bool,
    ) -> Result<Option<Vec<AssetRecord>>, StoreError> {
        let conn = self.lock();
        let Some(record) = fetch_record(&conn, &derive_library_id(path))? else {
            return Ok(None);
        };
        if make_current {
            set_metadata(&conn, CURRENT_LIBRARY_KEY, &record.id)?;
        }
        Ok(Some(record.songs))
    }

    /// Full cached record for a folder.
    pub fn record(&self, path: &Path) -> Result<Option<LibraryRecord>, StoreError> {
        fetch_record(&self.lock(), &derive_library_id(path))
    }

    /// Every cached record, most recently scanned first.
    pub fn list(&self) -> Result<Vec<LibraryRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, path, songs_json, last_scanned, song_count, total_size, version
             FROM libraries
             ORDER BY last_scanned DESC",
        )?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(record_from_row(row)?);
        }
        Ok(records)
    }

    /// True when the folder has no cached record or the record has outlived
    /// the configured expiry.
    pub fn needs_refresh(&self, path: &Path) -> Result<bool, StoreError> {
        let conn = self.lock();
        let last: Option<i64> = conn
            .query_row(
                "SELECT last_scanned FROM libraries WHERE id = ?1",
                params![derive_library_id(path)],
                |row| row.get(0),
            )
            .optional()?;
        let Some(last) = last else {
            return Ok(true);
        };
        let expiry_ms = i64::from(self.options.cache_expiry_days) * MILLIS_PER_DAY;
        Ok(now_millis() - last > expiry_ms)
    }

    /// Delete the cached record for a folder. Clears the current-library
    /// pointer when it referenced this record; choosing a replacement is the
    /// caller's job.
    pub fn remove_library(&self, path: &Path) -> Result<(), StoreError> {
        let id = derive_library_id(path);
        let conn = self.lock();
        conn.execute("DELETE FROM libraries WHERE id = ?1", params![id])?;
        if get_metadata(&conn, CURRENT_LIBRARY_KEY)?.as_deref() == Some(id.as_str()) {
            delete_metadata(&conn, CURRENT_LIBRARY_KEY)?;
        }
        Ok(())
    }

    /// Append a song to a cached library's song list, replacing any entry
    /// with the same path. Warns and does nothing when the library is not
    /// cached.
    pub fn add_song_to_library(&self, path: &Path, song: &AssetRecord) -> Result<(), StoreError> {
        self.mutate_songs(path, "add song", |songs| {
            songs.retain(|existing| existing.path != song.path);
            songs.push(song.clone());
            true
        })
    }

    /// Patch tag metadata on one song in a cached library, matched by path.
    /// Only `Some` fields of the patch are applied. Warns and does nothing
    /// when the library or the song is not cached.
    pub fn update_song_metadata(
        &self,
        path: &Path,
        song_path: &Path,
        patch: &TagMetadata,
    ) -> Result<(), StoreError> {
        self.mutate_songs(path, "update song metadata", |songs| {
            let Some(song) = songs.iter_mut().find(|song| song.path == song_path) else {
                warn!(
                    library = %path.display(),
                    song = %song_path.display(),
                    "Cannot update song metadata; song not in cached library"
                );
                return false;
            };
            if let Some(title) = &patch.title {
                song.title = Some(title.clone());
            }
            if let Some(artist) = &patch.artist {
                song.artist = Some(artist.clone());
            }
            if let Some(album) = &patch.album {
                song.album = Some(album.clone());
            }
            if let Some(genre) = &patch.genre {
                song.genre = Some(genre.clone());
            }
            if let Some(year) = patch.year {
                song.year = Some(year);
            }
            true
        })
    }

    /// Id of the current library, if one is set.
    pub fn current_library_id(&self) -> Result<Option<String>, StoreError> {
        get_metadata(&self.lock(), CURRENT_LIBRARY_KEY)
    }

    fn mutate_songs(
        &self,
        path: &Path,
        what: &str,
        apply: impl FnOnce(&mut Vec<AssetRecord>) -> bool,
    ) -> Result<(), StoreError> {
        let conn = self.lock();
        let id = derive_library_id(path);
        let Some(mut record) = fetch_record(&conn, &id)? else {
            warn!(library = %path.display(), "Cannot {what}; library is not cached");
            return Ok(());
        };
        if !apply(&mut record.songs) {
            return Ok(());
        }
        record.song_count = record.songs.len();
        record.total_size = record.songs.iter().map(|song| song.size).sum();
        let songs_json =
            serde_json::to_string(&record.songs).map_err(|source| StoreError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        upsert_record(&conn, &record, &songs_json)?;
        Ok(())
    }

    fn stored_bytes_excluding(
        &self,
        conn: &Connection,
        id: &str,
    ) -> Result<u64, StoreError> {
        let bytes: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(songs_json)), 0) FROM libraries WHERE id != ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(bytes.max(0) as u64)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.connection
            .lock()
            .expect("library store mutex poisoned")
    }

    #[cfg(test)]
    pub(crate) fn set_last_scanned_for_test(&self, path: &Path, millis: i64) {
        self.lock()
            .execute(
                "UPDATE libraries SET last_scanned = ?1 WHERE id = ?2",
                params![millis, derive_library_id(path)],
            )
            .unwrap();
    }

    #[cfg(test)]
    pub(crate) fn insert_raw_for_test(&self, id: &str, path: &Path, last_scanned: i64) {
        self.lock()
            .execute(
                "INSERT OR REPLACE INTO libraries
                 (id, name, path, songs_json, last_scanned, song_count, total_size, version)
                 VALUES (?1, ?2, ?3, '[]', ?4, 0, 0, 1)",
                params![id, default_library_name(path), path.to_string_lossy(), last_scanned],
            )
            .unwrap();
    }

    #[cfg(test)]
    pub(crate) fn set_current_for_test(&self, id: &str) {
        set_metadata(&self.lock(), CURRENT_LIBRARY_KEY, id).unwrap();
    }

    #[cfg(test)]
    pub(crate) fn run_legacy_migration_for_test(&self) {
        migrate_legacy_ids(&self.lock()).unwrap();
    }
}

/// Stable id for a library folder: SHA-256 over the normalized path.
pub fn derive_library_id(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_library_path(path).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Previous id scheme: 32-bit rolling hash of the normalized path, kept only
/// so old records can be recognized and rekeyed on open.
pub fn legacy_library_id(path: &Path) -> String {
    let mut hash: u32 = 0;
    for byte in normalize_library_path(path).bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(u32::from(byte));
    }
    format!("{hash:08x}")
}

fn normalize_library_path(path: &Path) -> String {
    let mut text = path.to_string_lossy().replace('\\', "/").to_lowercase();
    while text.len() > 1 && text.ends_with('/') {
        text.pop();
    }
    text
}

fn default_library_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("Library")
        .to_string()
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis().min(i64::MAX as u128) as i64)
        .unwrap_or(0)
}

fn apply_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS libraries (
             id TEXT PRIMARY KEY,
             name TEXT NOT NULL,
             path TEXT NOT NULL,
             songs_json TEXT NOT NULL,
             last_scanned INTEGER NOT NULL,
             song_count INTEGER NOT NULL,
             total_size INTEGER NOT NULL,
             version INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS metadata (
             key TEXT PRIMARY KEY,
             value TEXT NOT NULL
         );",
    )
}

fn migrate_legacy_ids(conn: &Connection) -> Result<(), rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT id, path FROM libraries")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);

    for (stored_id, path_text) in rows {
        let path = PathBuf::from(&path_text);
        let current_id = derive_library_id(&path);
        if stored_id == current_id || stored_id != legacy_library_id(&path) {
            continue;
        }
        let already_present: Option<String> = conn
            .query_row(
                "SELECT id FROM libraries WHERE id = ?1",
                params![current_id],
                |row| row.get(0),
            )
            .optional()?;
        if already_present.is_some() {
            conn.execute("DELETE FROM libraries WHERE id = ?1", params![stored_id])?;
        } else {
            conn.execute(
                "UPDATE libraries SET id = ?1, version = ?2 WHERE id = ?3",
                params![current_id, LIBRARY_RECORD_VERSION, stored_id],
            )?;
        }
        if get_metadata(conn, CURRENT_LIBRARY_KEY)
            .map_err(to_sql_error)?
            .as_deref()
            == Some(stored_id.as_str())
        {
            set_metadata(conn, CURRENT_LIBRARY_KEY, &current_id)?;
        }
        debug!(old = %stored_id, new = %current_id, path = %path_text, "Migrated legacy library id");
    }
    Ok(())
}

fn to_sql_error(err: StoreError) -> rusqlite::Error {
    match err {
        StoreError::Sql(err) => err,
        other => rusqlite::Error::ToSqlConversionFailure(Box::new(other)),
    }
}

fn evict_oldest_quarter(conn: &Connection, keep_id: &str) -> Result<(), rusqlite::Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM libraries WHERE id != ?1",
        params![keep_id],
        |row| row.get(0),
    )?;
    if count == 0 {
        return Ok(());
    }
    let evict = ((count as f64) * EVICTION_FRACTION).ceil().max(1.0) as i64;
    let removed = conn.execute(
        "DELETE FROM libraries WHERE id IN (
             SELECT id FROM libraries WHERE id != ?1
             ORDER BY last_scanned ASC LIMIT ?2
         )",
        params![keep_id, evict],
    )?;
    warn!(removed, "Evicted least recently scanned libraries to stay under quota");

    // The current pointer may now dangle.
    if let Some(current) = get_metadata(conn, CURRENT_LIBRARY_KEY).map_err(to_sql_error)? {
        let still_there: Option<String> = conn
            .query_row(
                "SELECT id FROM libraries WHERE id = ?1",
                params![current],
                |row| row.get(0),
            )
            .optional()?;
        if still_there.is_none() {
            delete_metadata(conn, CURRENT_LIBRARY_KEY)?;
        }
    }
    Ok(())
}

fn upsert_record(
    conn: &Connection,
    record: &LibraryRecord,
    songs_json: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO libraries
         (id, name, path, songs_json, last_scanned, song_count, total_size, version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             path = excluded.path,
             songs_json = excluded.songs_json,
             last_scanned = excluded.last_scanned,
             song_count = excluded.song_count,
             total_size = excluded.total_size,
             version = excluded.version",
        params![
            record.id,
            record.name,
            record.path.to_string_lossy(),
            songs_json,
            record.last_scanned_ms,
            record.song_count as i64,
            record.total_size as i64,
            record.version,
        ],
    )?;
    Ok(())
}

fn fetch_record(conn: &Connection, id: &str) -> Result<Option<LibraryRecord>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, path, songs_json, last_scanned, song_count, total_size, version
         FROM libraries WHERE id = ?1",
    )?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(record_from_row(row)?)),
        None => Ok(None),
    }
}

fn record_from_row(row: &rusqlite::Row<'_>) -> Result<LibraryRecord, StoreError> {
    let path = PathBuf::from(row.get::<_, String>(2)?);
    let songs_json: String = row.get(3)?;
    let songs: Vec<AssetRecord> =
        serde_json::from_str(&songs_json).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
    Ok(LibraryRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        path,
        songs,
        last_scanned_ms: row.get(4)?,
        song_count: row.get::<_, i64>(5)?.max(0) as usize,
        total_size: row.get::<_, i64>(6)?.max(0) as u64,
        version: row.get(7)?,
    })
}

fn get_metadata(conn: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?)
}

fn set_metadata(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO metadata (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn delete_metadata(conn: &Connection, key: &str) -> Result<(), rusqlite::Error> {
    conn.execute("DELETE FROM metadata WHERE key = ?1", params![key])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(path: &str, size: u64) -> AssetRecord {
        AssetRecord::untagged(PathBuf::from(path), "song".into(), size)
    }

    fn store() -> LibraryStore {
        LibraryStore::open_in_memory(StoreOptions::default()).unwrap()
    }

    #[test]
    fn save_and_load_round_trip() {
        let store = store();
        let root = Path::new("/music/road trip");
        let songs = vec![song("/music/road trip/a.mp3", 100), song("/music/road trip/b.wav", 50)];
        let record = store.save_library(root, &songs, None, true).unwrap();
        assert_eq!(record.song_count, 2);
        assert_eq!(record.total_size, 150);
        assert_eq!(record.name, "road trip");
        assert_eq!(record.version, LIBRARY_RECORD_VERSION);

        let loaded = store.load_library(root, false).unwrap().unwrap();
        assert_eq!(loaded, songs);
        assert_eq!(
            store.current_library_id().unwrap().as_deref(),
            Some(record.id.as_str())
        );
    }

    #[test]
    fn missing_library_loads_none_and_needs_refresh() {
        let store = store();
        let root = Path::new("/music/absent");
        assert!(store.load_library(root, false).unwrap().is_none());
        assert!(store.needs_refresh(root).unwrap());
    }

    #[test]
    fn needs_refresh_after_expiry() {
        let store = LibraryStore::open_in_memory(StoreOptions {
            cache_expiry_days: 1,
            ..StoreOptions::default()
        })
        .unwrap();
        let root = Path::new("/music/stale");
        store.save_library(root, &[], None, false).unwrap();
        assert!(!store.needs_refresh(root).unwrap());

        store.set_last_scanned_for_test(root, now_millis() - 2 * MILLIS_PER_DAY);
        assert!(store.needs_refresh(root).unwrap());
    }

    #[test]
    fn remove_clears_current_pointer() {
        let store = store();
        let root = Path::new("/music/gone");
        store.save_library(root, &[], None, true).unwrap();
        store.remove_library(root).unwrap();
        assert!(store.current_library_id().unwrap().is_none());
        assert!(store.load_library(root, false).unwrap().is_none());
    }

    #[test]
    fn add_song_recomputes_totals_and_replaces_by_path() {
        let store = store();
        let root = Path::new("/music/grow");
        store
            .save_library(root, &[song("/music/grow/a.mp3", 10)], None, false)
            .unwrap();
        store
            .add_song_to_library(root, &song("/music/grow/b.mp3", 20))
            .unwrap();
        store
            .add_song_to_library(root, &song("/music/grow/b.mp3", 25))
            .unwrap();
        let record = store.record(root).unwrap().unwrap();
        assert_eq!(record.song_count, 2);
        assert_eq!(record.total_size, 35);
    }

    #[test]
    fn add_song_to_uncached_library_is_a_noop() {
        let store = store();
        store
            .add_song_to_library(Path::new("/music/nowhere"), &song("/x.mp3", 1))
            .unwrap();
        assert!(store.record(Path::new("/music/nowhere")).unwrap().is_none());
    }

    #[test]
    fn update_song_metadata_applies_patch_fields() {
        let store = store();
        let root = Path::new("/music/tagged");
        store
            .save_library(root, &[song("/music/tagged/a.mp3", 10)], None, false)
            .unwrap();
        let patch = TagMetadata {
            title: Some("Better Title".into()),
            year: Some(1999),
            ..TagMetadata::default()
        };
        store
            .update_song_metadata(root, Path::new("/music/tagged/a.mp3"), &patch)
            .unwrap();
        let record = store.record(root).unwrap().unwrap();
        assert_eq!(record.songs[0].title.as_deref(), Some("Better Title"));
        assert_eq!(record.songs[0].year, Some(1999));
        assert!(record.songs[0].artist.is_none());
    }

    #[test]
    fn quota_eviction_drops_oldest_then_retries() {
        // Budget for three and a half song lists: the fourth save must evict
        // the oldest library and then succeed.
        let songs = vec![song("/m/a-song-with-a-path.mp3", 10)];
        let one_list = serde_json::to_string(&songs).unwrap().len() as u64;
        let store = LibraryStore::open_in_memory(StoreOptions {
            quota_bytes: one_list * 3 + one_list / 2,
            cache_expiry_days: 7,
        })
        .unwrap();
        for (idx, root) in ["/m/one", "/m/two", "/m/three"].iter().enumerate() {
            store.save_library(Path::new(root), &songs, None, false).unwrap();
            store.set_last_scanned_for_test(Path::new(root), 1000 + idx as i64);
        }
        store
            .save_library(Path::new("/m/four"), &songs, None, false)
            .unwrap();

        // Oldest record evicted, newest written.
        assert!(store.record(Path::new("/m/one")).unwrap().is_none());
        assert!(store.record(Path::new("/m/four")).unwrap().is_some());
    }

    #[test]
    fn over_quota_even_after_eviction_is_storage_full() {
        let store = LibraryStore::open_in_memory(StoreOptions {
            quota_bytes: 4,
            cache_expiry_days: 7,
        })
        .unwrap();
        let err = store
            .save_library(Path::new("/m/huge"), &[song("/m/huge/a.mp3", 1)], None, false)
            .unwrap_err();
        assert!(matches!(err, StoreError::StorageFull));
        assert!(store.record(Path::new("/m/huge")).unwrap().is_none());
    }

    #[test]
    fn legacy_ids_are_migrated_on_open() {
        let store = store();
        let root = Path::new("/music/old school");
        store.insert_raw_for_test(&legacy_library_id(root), root, 123);
        store.set_current_for_test(&legacy_library_id(root));

        store.run_legacy_migration_for_test();

        let record = store.record(root).unwrap().unwrap();
        assert_eq!(record.id, derive_library_id(root));
        assert_eq!(
            store.current_library_id().unwrap().as_deref(),
            Some(derive_library_id(root).as_str())
        );
    }

    #[test]
    fn id_derivation_normalizes_case_and_slashes() {
        let a = derive_library_id(Path::new("/Music/Party"));
        let b = derive_library_id(Path::new("/music/party/"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(legacy_library_id(Path::new("/Music/Party")).len(), 8);
    }
}

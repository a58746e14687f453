use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use fetchcache_core::CacheKey;
use tracing::{debug, trace, warn};

use crate::lock::LockedFile;
use crate::naming::{EntryKind, EntryName, RESPONSE_NAME};
use crate::{CacheEntry, StorageError, StorageResult};

/// Status of a single-entry deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    /// The file existed and was removed.
    Deleted,
    /// There was nothing to remove.
    Missing,
}

/// Outcome of [`CacheStore::purge_expired`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    /// Expired response entries removed.
    pub responses: usize,
    /// Expired cookie jars removed.
    pub cookies: usize,
}

impl PurgeStats {
    /// Total number of files removed.
    pub fn removed(&self) -> usize {
        self.responses + self.cookies
    }
}

/// Response cache rooted at one directory.
///
/// Any number of stores, in this process or others, may share a directory.
/// Two concurrent misses for the same key may both write; each write is
/// atomic with respect to readers thanks to the per-file lock, and the last
/// writer wins.
///
/// ```no_run
/// # async fn run() -> Result<(), fetchcache_fs::StorageError> {
/// use fetchcache_fs::CacheStore;
///
/// let store = CacheStore::new("/var/cache/fetchcache");
/// let stats = store.purge_expired().await?;
/// println!("removed {} files", stats.removed());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Creates a store over `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the newest valid entry for `key` along with its path.
    ///
    /// Files that vanish, cannot be read or fail to decode are skipped, so
    /// a racing purge or a corrupt file is just a miss.
    pub async fn lookup(&self, key: &CacheKey) -> StorageResult<Option<(PathBuf, CacheEntry)>> {
        let dir = self.dir.clone();
        let key = *key;
        tokio::task::spawn_blocking(move || lookup_at(&dir, &key, SystemTime::now())).await?
    }

    /// Removes other files for the same key, then writes `entry` as
    /// `RESPON-<key>.<ttl>`.
    pub async fn store(&self, key: &CacheKey, entry: &CacheEntry, ttl: u64) -> StorageResult<PathBuf> {
        let dir = self.dir.clone();
        let key = *key;
        let bytes = entry.to_bytes()?;
        tokio::task::spawn_blocking(move || store_at(&dir, &key, &bytes, ttl)).await?
    }

    /// Removes every response and cookie file whose TTL elapsed.
    pub async fn purge_expired(&self) -> StorageResult<PurgeStats> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || purge_at(&dir, SystemTime::now())).await?
    }

    /// Removes one response entry by bare file name.
    ///
    /// Only `RESPON-<40 hex>.<ttl>` names are accepted; paths, cookie files
    /// and anything else fail with [`StorageError::InvalidEntryName`].
    pub async fn delete_entry(&self, filename: &str) -> StorageResult<DeleteStatus> {
        if !RESPONSE_NAME.is_match(filename) {
            return Err(StorageError::InvalidEntryName(filename.to_string()));
        }
        let path = self.dir.join(filename);
        tokio::task::spawn_blocking(move || match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "Deleted cache entry");
                Ok(DeleteStatus::Deleted)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DeleteStatus::Missing),
            Err(e) => Err(StorageError::Io(e)),
        })
        .await?
    }
}

/// Lists parsable entry files in `dir`. A missing directory is empty.
fn entries(dir: &Path) -> io::Result<Vec<(PathBuf, EntryName)>> {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut found = Vec::new();
    for dir_entry in read_dir {
        let dir_entry = dir_entry?;
        let file_name = dir_entry.file_name();
        if let Some(name) = file_name.to_str().and_then(EntryName::parse) {
            found.push((dir_entry.path(), name));
        }
    }
    Ok(found)
}

fn modified(path: &Path) -> io::Result<Option<SystemTime>> {
    match fs::metadata(path) {
        Ok(metadata) => metadata.modified().map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

pub(crate) fn lookup_at(
    dir: &Path,
    key: &CacheKey,
    now: SystemTime,
) -> StorageResult<Option<(PathBuf, CacheEntry)>> {
    let mut live = Vec::new();
    for (path, name) in entries(dir)? {
        if name.kind() != EntryKind::Response || name.key() != *key {
            continue;
        }
        let Some(mtime) = modified(&path)? else {
            continue;
        };
        if name.is_live_at(mtime, now) {
            live.push((mtime, path));
        } else {
            trace!(path = %path.display(), "Skipping expired cache entry");
        }
    }

    live.sort_by(|a, b| b.0.cmp(&a.0));

    for (_, path) in live {
        match read_locked(&path) {
            Ok(Some(bytes)) if !bytes.is_empty() => match CacheEntry::from_bytes(&bytes) {
                Ok(entry) => return Ok(Some((path, entry))),
                Err(error) => {
                    warn!(path = %path.display(), %error, "Undecodable cache entry");
                }
            },
            Ok(_) => {
                debug!(path = %path.display(), "Cache entry vanished or is empty");
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "Unreadable cache entry");
            }
        }
    }
    Ok(None)
}

fn read_locked(path: &Path) -> io::Result<Option<Vec<u8>>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut locked = LockedFile::acquire(file)?;
    let mut bytes = Vec::new();
    locked.file().read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}

pub(crate) fn store_at(dir: &Path, key: &CacheKey, bytes: &[u8], ttl: u64) -> StorageResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let name = EntryName::response(*key, ttl);
    let path = dir.join(name.to_string());

    // Siblings go before the write, so a concurrent store of the same key
    // with another TTL can leave both files behind but never neither.
    for (sibling, other) in entries(dir)? {
        if other.kind() == EntryKind::Response && other.key() == *key && other != name {
            remove_if_present(&sibling)?;
        }
    }

    {
        // Opened without truncation: truncating before the lock is held
        // would let a concurrent reader see an empty file.
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let mut locked = LockedFile::acquire(file)?;
        let file = locked.file();
        file.set_len(0)?;
        file.write_all(bytes)?;
        file.flush()?;
    }

    debug!(path = %path.display(), ttl, "Stored cache entry");
    Ok(path)
}

pub(crate) fn purge_at(dir: &Path, now: SystemTime) -> StorageResult<PurgeStats> {
    let mut stats = PurgeStats::default();
    for (path, name) in entries(dir)? {
        let Some(mtime) = modified(&path)? else {
            continue;
        };
        if name.is_live_at(mtime, now) {
            continue;
        }
        if remove_if_present(&path)? {
            match name.kind() {
                EntryKind::Response => stats.responses += 1,
                EntryKind::Cookie => stats.cookies += 1,
            }
        }
    }
    if stats.removed() > 0 {
        debug!(responses = stats.responses, cookies = stats.cookies, "Purged expired files");
    }
    Ok(stats)
}

pub(crate) fn remove_if_present(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

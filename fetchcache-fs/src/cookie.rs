use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use fetchcache_core::CacheKey;
use tracing::debug;

use crate::StorageResult;
use crate::naming::EntryName;
use crate::store::remove_if_present;

/// Maps destination hosts to cookie files in the cache directory.
///
/// The jar only manages names and lifetimes. Reading and appending cookie
/// lines is left to the transport.
#[derive(Debug, Clone)]
pub struct CookieJar {
    dir: PathBuf,
}

impl CookieJar {
    /// Creates a jar manager over `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the cookie file for `host`, named `COOKIE-<digest>.<ttl>`.
    ///
    /// The file itself is not created. If it exists but has expired it is
    /// removed first so the transport starts with an empty jar.
    pub async fn path_for(&self, host: &str, ttl: u64) -> StorageResult<PathBuf> {
        let dir = self.dir.clone();
        let host = host.to_string();
        tokio::task::spawn_blocking(move || path_for_at(&dir, &host, ttl, SystemTime::now())).await?
    }
}

pub(crate) fn path_for_at(dir: &Path, host: &str, ttl: u64, now: SystemTime) -> StorageResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let name = EntryName::cookie(CacheKey::for_host(host), ttl);
    let path = dir.join(name.to_string());

    if let Ok(metadata) = fs::metadata(&path) {
        let modified = metadata.modified()?;
        if !name.is_live_at(modified, now) && remove_if_present(&path)? {
            debug!(host, path = %path.display(), "Discarded expired cookie jar");
        }
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn path_is_deterministic_per_host() {
        let temp_dir = TempDir::new().unwrap();
        let jar = CookieJar::new(temp_dir.path());

        let first = jar.path_for("example.test", 600).await.unwrap();
        let again = jar.path_for("example.test", 600).await.unwrap();
        let other = jar.path_for("other.test", 600).await.unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(
            first.file_name().unwrap().to_str().unwrap(),
            format!("COOKIE-{}.600", CacheKey::for_host("example.test"))
        );
        assert!(!first.exists());
    }

    #[tokio::test]
    async fn live_jar_is_kept() {
        let temp_dir = TempDir::new().unwrap();
        let jar = CookieJar::new(temp_dir.path());

        let path = jar.path_for("example.test", 600).await.unwrap();
        fs::write(&path, "session=abc\n").unwrap();

        let again = jar.path_for("example.test", 600).await.unwrap();
        assert_eq!(fs::read_to_string(again).unwrap(), "session=abc\n");
    }

    #[test]
    fn expired_jar_is_discarded() {
        let temp_dir = TempDir::new().unwrap();
        let path = path_for_at(temp_dir.path(), "example.test", 60, SystemTime::now()).unwrap();
        fs::write(&path, "session=abc\n").unwrap();
        let modified = fs::metadata(&path).unwrap().modified().unwrap();

        let later = modified + Duration::from_secs(60);
        let again = path_for_at(temp_dir.path(), "example.test", 60, later).unwrap();
        assert_eq!(again, path);
        assert!(!path.exists());
    }
}

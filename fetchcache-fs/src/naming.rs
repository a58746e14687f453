//! File names that carry identity and TTL.
//!
//! Formatting and parsing live side by side with the validity rule so the
//! three can never disagree.

use std::fmt;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use fetchcache_core::CacheKey;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ENTRY_NAME: Regex =
        Regex::new(r"^(RESPON|COOKIE)-([0-9a-f]{40})\.([0-9]+)$").expect("valid entry name regex");
    pub(crate) static ref RESPONSE_NAME: Regex =
        Regex::new(r"^RESPON-[0-9a-f]{40}\.[0-9]+$").expect("valid response name regex");
}

/// What a cache directory file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// A serialized response, `RESPON-`.
    Response,
    /// A cookie jar for one host, `COOKIE-`.
    Cookie,
}

impl EntryKind {
    /// File name prefix, dash included.
    pub const fn prefix(&self) -> &'static str {
        match self {
            EntryKind::Response => "RESPON-",
            EntryKind::Cookie => "COOKIE-",
        }
    }
}

/// A parsed cache directory file name.
///
/// ```
/// use fetchcache_core::CacheKey;
/// use fetchcache_fs::{EntryKind, EntryName};
///
/// let key = CacheKey::for_host("example.test");
/// let name = EntryName::cookie(key, 600);
/// let text = name.to_string();
///
/// assert!(text.starts_with("COOKIE-"));
/// assert!(text.ends_with(".600"));
/// assert_eq!(EntryName::parse(&text), Some(name));
/// assert_eq!(name.kind(), EntryKind::Cookie);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryName {
    kind: EntryKind,
    key: CacheKey,
    ttl: u64,
}

impl EntryName {
    /// Name of a response entry.
    pub fn response(key: CacheKey, ttl: u64) -> Self {
        Self {
            kind: EntryKind::Response,
            key,
            ttl,
        }
    }

    /// Name of a cookie jar.
    pub fn cookie(key: CacheKey, ttl: u64) -> Self {
        Self {
            kind: EntryKind::Cookie,
            key,
            ttl,
        }
    }

    /// Parses a bare file name. Anything not matching
    /// `(RESPON|COOKIE)-<40 lowercase hex>.<decimal>` is `None`.
    pub fn parse(name: &str) -> Option<Self> {
        let caps = ENTRY_NAME.captures(name)?;
        let kind = match &caps[1] {
            "RESPON" => EntryKind::Response,
            _ => EntryKind::Cookie,
        };
        let key = CacheKey::from_hex(&caps[2])?;
        // Digits only, but may still overflow u64.
        let ttl = caps[3].parse().ok()?;
        Some(Self { kind, key, ttl })
    }

    /// Parses the final component of `path`.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_name()?.to_str().and_then(Self::parse)
    }

    /// Entry kind.
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Digest embedded in the name.
    pub fn key(&self) -> CacheKey {
        self.key
    }

    /// TTL in seconds embedded in the name.
    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    /// Valid while `modified + ttl > now`. Equality counts as expired.
    pub fn is_live_at(&self, modified: SystemTime, now: SystemTime) -> bool {
        match modified.checked_add(Duration::from_secs(self.ttl)) {
            Some(expires) => expires > now,
            None => true,
        }
    }

    /// Checks validity of the file at `path` against the current time.
    pub fn is_live(&self, path: &Path) -> io::Result<bool> {
        let modified = path.metadata()?.modified()?;
        Ok(self.is_live_at(modified, SystemTime::now()))
    }
}

impl fmt::Display for EntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}.{}", self.kind.prefix(), self.key, self.ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CacheKey {
        CacheKey::for_host("example.test")
    }

    #[test]
    fn formats_response_names() {
        let name = EntryName::response(key(), 3600).to_string();
        assert_eq!(name, format!("RESPON-{}.3600", key()));
        assert_eq!(name.len(), "RESPON-".len() + 40 + ".3600".len());
    }

    #[test]
    fn parse_inverts_format() {
        for name in [EntryName::response(key(), 0), EntryName::cookie(key(), 2_592_000)] {
            assert_eq!(EntryName::parse(&name.to_string()), Some(name));
        }
    }

    #[test]
    fn parse_rejects_foreign_names() {
        let hex = key().to_string();
        let rejected = [
            format!("RESPON-{hex}"),
            format!("RESPON-{hex}.-5"),
            format!("RESPON-{hex}.10.tmp"),
            format!("RESPON-{}.10", hex.to_uppercase()),
            format!("RESPON-{}.10", &hex[..39]),
            format!("OTHER-{hex}.10"),
            format!("../RESPON-{hex}.10"),
            format!("RESPON-{hex}.99999999999999999999999"),
            ".DS_Store".to_string(),
        ];
        for name in rejected {
            assert_eq!(EntryName::parse(&name), None, "{name}");
        }
    }

    #[test]
    fn validity_boundary_is_exclusive() {
        let name = EntryName::response(key(), 60);
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);

        assert!(name.is_live_at(modified, modified));
        assert!(name.is_live_at(modified, modified + Duration::from_secs(59)));
        assert!(!name.is_live_at(modified, modified + Duration::from_secs(60)));
        assert!(!name.is_live_at(modified, modified + Duration::from_secs(61)));
    }

    #[test]
    fn zero_ttl_is_never_live() {
        let name = EntryName::response(key(), 0);
        let now = SystemTime::now();
        assert!(!name.is_live_at(now, now));
    }

    #[test]
    fn response_regex_only_accepts_response_entries() {
        let hex = key().to_string();
        assert!(RESPONSE_NAME.is_match(&format!("RESPON-{hex}.1")));
        assert!(!RESPONSE_NAME.is_match(&format!("COOKIE-{hex}.1")));
        assert!(!RESPONSE_NAME.is_match(&format!("/tmp/RESPON-{hex}.1")));
    }
}

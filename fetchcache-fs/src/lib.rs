#![warn(missing_docs)]
//! # fetchcache-fs
//!
//! Filesystem-as-database storage for fetchcache.
//!
//! Every cached response lives in its own file named
//! `RESPON-<digest>.<ttl>` and every per-host cookie jar in
//! `COOKIE-<digest-of-host>.<ttl>`. There is no index and no metadata store:
//! an entry is valid while its modification time plus the TTL from its name
//! lies in the future.
//!
//! - [`EntryName`] formats and parses file names and decides validity
//! - [`CacheStore`] looks up, stores, purges and deletes response entries
//! - [`CookieJar`] hands out cookie file paths per host
//!
//! All blocking file I/O runs on tokio's blocking pool. Reads and writes of
//! a single file hold an exclusive advisory lock for their duration.

mod cookie;
mod entry;
mod error;
mod lock;
mod naming;
mod store;

pub use cookie::CookieJar;
pub use entry::CacheEntry;
pub use error::StorageError;
pub use naming::{EntryKind, EntryName};
pub use store::{CacheStore, DeleteStatus, PurgeStats};

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

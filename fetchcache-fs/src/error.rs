use thiserror::Error;

/// Errors raised by [`CacheStore`](crate::CacheStore) and
/// [`CookieJar`](crate::CookieJar).
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading, writing or listing the cache directory failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An entry could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A file name given for deletion is not a response entry name.
    #[error("Invalid cache entry name: {0:?}")]
    InvalidEntryName(String),

    /// The blocking task running the file operation failed.
    #[error("Blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

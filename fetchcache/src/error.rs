use std::fmt;
use std::time::Duration;

use fetchcache_core::{InvalidMethod, TransportErrorKind};
use fetchcache_fs::StorageError;
use thiserror::Error;

/// Errors surfaced by [`FetchEngine`](crate::FetchEngine).
#[derive(Debug, Error)]
pub enum FetchError {
    /// Malformed URL or unsupported method.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing trust anchor, bad redirect limit, malformed header lines.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport failure in strict mode.
    #[error("{0}")]
    Transport(Diagnostic),

    /// Storage failure of a maintenance operation.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<InvalidMethod> for FetchError {
    fn from(error: InvalidMethod) -> Self {
        FetchError::InvalidRequest(error.to_string())
    }
}

/// Context of a transport failure reported in strict mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Classified failure.
    pub kind: TransportErrorKind,
    /// Transport's own description of the failure.
    pub message: String,
    /// Target URL.
    pub url: String,
    /// Retries spent before giving up.
    pub retries: u32,
    /// Status of the last response seen, e.g. the final 3xx of a redirect
    /// loop.
    pub status: Option<u16>,
    /// Duration of the last attempt.
    pub attempt_time: Duration,
    /// Duration of the whole call, retry delays included.
    pub total_time: Duration,
}

impl Diagnostic {
    /// Stable code of the failure.
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "transport error")?;
        writeln!(f, "  {:<10} {}", "error:", self.code())?;
        writeln!(f, "  {:<10} {}", "message:", self.message)?;
        writeln!(f, "  {:<10} {}", "retries:", self.retries)?;
        writeln!(f, "  {:<10} {}", "url:", self.url)?;
        match self.status {
            Some(status) => writeln!(f, "  {:<10} {}", "status:", status)?,
            None => writeln!(f, "  {:<10} -", "status:")?,
        }
        writeln!(f, "  {:<10} {:?}", "attempt:", self.attempt_time)?;
        write!(f, "  {:<10} {:?}", "total:", self.total_time)
    }
}

//! The value returned by every fetch.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::headers::ResponseHeaders;
use crate::request::Method;
use crate::transport::TransportErrorKind;

/// Where a [`FetchResult`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Fetched over the network during this call.
    #[default]
    New,
    /// Read from a valid cache entry.
    Cache,
}

impl Origin {
    /// `"new"` or `"cache"`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Origin::New => "new",
            Origin::Cache => "cache",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one logical fetch.
///
/// A degraded result (transport failure outside strict mode) has status 0,
/// empty headers and body, and `error` set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult {
    /// Requested URL.
    pub url: String,
    /// Request method.
    pub method: Method,
    /// Encoded request body, empty unless POST.
    pub request_body: String,
    /// User-agent sent with the request.
    pub user_agent: String,
    /// Response headers.
    pub headers: ResponseHeaders,
    /// Response body.
    pub body: Bytes,
    /// HTTP status, 0 when no response was received.
    pub status: u16,
    /// Cache entry this result was read from or written to.
    pub cache_file: Option<PathBuf>,
    /// Lookup time for cache hits, transport time otherwise.
    pub execution_time: Duration,
    /// Cookie file handed to the transport.
    pub cookie_file: Option<PathBuf>,
    /// Network or cache.
    pub origin: Origin,
    /// Transport failure classification, `None` on success.
    pub error: Option<TransportErrorKind>,
}

impl FetchResult {
    /// Error code of the failure, `""` on success.
    pub fn error_code(&self) -> &'static str {
        self.error.map(|kind| kind.code()).unwrap_or("")
    }

    /// Whether the transport call succeeded (any HTTP status counts).
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Whether the result was served from disk.
    pub fn is_cached(&self) -> bool {
        self.origin == Origin::Cache
    }

    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

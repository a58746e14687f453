use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use fetchcache_core::{FetchResult, Method, Origin, ResponseHeaders, TransportErrorKind};
use serde::{Deserialize, Serialize};

use crate::StorageResult;

/// A response as persisted in a `RESPON-` file.
///
/// The TTL is not stored here; it is part of the file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Requested URL.
    pub url: String,
    /// Request method.
    pub method: Method,
    /// Encoded request body.
    pub request_body: String,
    /// User-agent sent with the request.
    pub user_agent: String,
    /// Response headers.
    pub headers: ResponseHeaders,
    /// Response body.
    pub body: Bytes,
    /// HTTP status.
    pub status: u16,
    /// Cookie file used by the original request.
    pub cookie_file: Option<PathBuf>,
    /// Origin of the result that was stored.
    pub origin: Origin,
    /// Transport time of the original request.
    pub execution_time: Duration,
    /// Always `None` for stored entries; kept so the record is complete.
    pub error: Option<TransportErrorKind>,
}

impl CacheEntry {
    /// Snapshot of a fresh result.
    pub fn from_result(result: &FetchResult) -> Self {
        Self {
            url: result.url.clone(),
            method: result.method,
            request_body: result.request_body.clone(),
            user_agent: result.user_agent.clone(),
            headers: result.headers.clone(),
            body: result.body.clone(),
            status: result.status,
            cookie_file: result.cookie_file.clone(),
            origin: result.origin,
            execution_time: result.execution_time,
            error: result.error,
        }
    }

    /// Turns the entry back into a result served from `cache_file`.
    pub fn into_cached_result(self, cache_file: PathBuf, lookup_time: Duration) -> FetchResult {
        FetchResult {
            url: self.url,
            method: self.method,
            request_body: self.request_body,
            user_agent: self.user_agent,
            headers: self.headers,
            body: self.body,
            status: self.status,
            cache_file: Some(cache_file),
            execution_time: lookup_time,
            cookie_file: self.cookie_file,
            origin: Origin::Cache,
            error: self.error,
        }
    }

    pub(crate) fn to_bytes(&self) -> StorageResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> StorageResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

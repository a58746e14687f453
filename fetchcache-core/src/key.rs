//! Cache key types and derivation.
//!
//! This module provides:
//!
//! - [`RequestIdentity`] - Everything that makes two requests "the same"
//! - [`CacheKey`] - A fixed-length digest of an identity
//!
//! ## Derivation
//!
//! The digest is SHA-256 over the method, the URL, the JSON form of the
//! header lines, the JSON form of the payload and the user-agent, each
//! followed by a NUL separator. The result is truncated to 160 bits and
//! rendered as 40 lowercase hex characters, which is what cache and cookie
//! filenames embed.
//!
//! Header lines are hashed in the order given. No sorting happens, so
//! callers wanting order-independent keys must supply headers in a
//! canonical order themselves.
//!
//! ```
//! use fetchcache_core::{CacheKey, Method, RequestIdentity};
//!
//! let identity = RequestIdentity::new(Method::Get, "http://example.test/a")
//!     .user_agent("fetchcache-test");
//! let key = CacheKey::derive(&identity);
//!
//! assert_eq!(key.to_string().len(), 40);
//! assert_eq!(key, CacheKey::derive(&identity.clone()));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::request::{Method, Payload};

/// Digest length in bytes.
pub const DIGEST_LEN: usize = 20;

const SEPARATOR: &[u8] = b"\0";

/// The parts of a request that determine its cache identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestIdentity {
    /// Request method.
    pub method: Method,
    /// Absolute request URL.
    pub url: String,
    /// Extra request header lines, `Name: value`, in caller order.
    pub headers: Vec<String>,
    /// Form payload.
    pub payload: Payload,
    /// User-agent sent with the request.
    pub user_agent: String,
}

impl RequestIdentity {
    /// Creates an identity with no headers, payload or user-agent.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            payload: Payload::default(),
            user_agent: String::new(),
        }
    }

    /// Sets the header lines.
    pub fn headers(mut self, headers: Vec<String>) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the payload.
    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Sets the user-agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// A 160-bit digest naming a cache entry or a cookie jar.
///
/// `Display` renders the digest as 40 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    digest: [u8; DIGEST_LEN],
}

impl CacheKey {
    /// Derives the key of a request identity.
    pub fn derive(identity: &RequestIdentity) -> Self {
        // Serializing a Vec<String> and a string map to JSON cannot fail.
        let headers = serde_json::to_vec(&identity.headers).unwrap_or_default();
        let payload = serde_json::to_vec(&identity.payload).unwrap_or_default();

        Self::from_parts([
            identity.method.as_str().as_bytes(),
            identity.url.as_bytes(),
            headers.as_slice(),
            payload.as_slice(),
            identity.user_agent.as_bytes(),
        ])
    }

    /// Derives the key naming the cookie jar of `host`.
    pub fn for_host(host: &str) -> Self {
        Self::from_parts([host.as_bytes()])
    }

    fn from_parts<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
            hasher.update(SEPARATOR);
        }
        let full = hasher.finalize();

        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&full[..DIGEST_LEN]);
        Self { digest }
    }

    /// Parses a key from its 40-character hex form.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let mut digest = [0u8; DIGEST_LEN];
        hex::decode_to_slice(hex, &mut digest).ok()?;
        Some(Self { digest })
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.digest))
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({self})")
    }
}

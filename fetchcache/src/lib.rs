#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! # fetchcache
//!
//! An HTTP fetch layer that caches responses on local disk, keeps cookies
//! per destination host and rides out transient DNS failures.
//!
//! A [`FetchEngine`] takes a URL, a [`Method`] and an optional form
//! [`Payload`] and returns a [`FetchResult`], either fresh from the
//! [`Transport`] or read back from a valid cache entry. The caller never
//! handles cache keys, TTLs or cookie files.
//!
//! The wire-level client is pluggable; `fetchcache-reqwest` provides one
//! built on `reqwest`.

/// The fetch engine.
///
/// [`FetchEngine`] validates the request, consults the disk cache, resolves
/// the cookie jar, calls the transport with bounded retry and stores
/// cacheable responses.
pub mod engine;

/// Engine configuration, loadable from YAML.
pub mod config;

/// Dogpile prevention for concurrent misses.
///
/// Duplicate fetches for one key are allowed by default
/// ([`NoopConcurrencyManager`](concurrency::NoopConcurrencyManager)).
/// [`KeyedConcurrencyManager`](concurrency::KeyedConcurrencyManager) lets
/// only one fetch per key run at a time within the process.
pub mod concurrency;

/// Error types for fetch operations.
pub mod error;

/// Metrics collection.
///
/// When the `metrics` feature is enabled, this module provides counters
/// for cache hits and misses, retries, transport errors and failed writes,
/// plus a fetch duration histogram.
pub mod metrics;

/// Bounded retry of transport calls.
pub mod retry;

mod url;

pub use concurrency::{ConcurrencyManager, KeyedConcurrencyManager, NoopConcurrencyManager};
pub use config::FetchConfig;
pub use engine::FetchEngine;
pub use error::{Diagnostic, FetchError};
pub use retry::RetryPolicy;

pub use fetchcache_core::{
    CacheKey, FetchResult, Method, Origin, Payload, RawResponse, RequestIdentity, ResponseHeaders,
    Transport, TransportError, TransportErrorKind, TransportRequest, TtlPolicy,
};
pub use fetchcache_fs::{DeleteStatus, PurgeStats, StorageError};

/// The `fetchcache` prelude.
///
/// ```rust
/// use fetchcache::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{FetchConfig, FetchEngine, FetchError, FetchResult, Method, Payload, Transport};
}

#![warn(missing_docs)]
//! # fetchcache-core
//!
//! Core types for the fetchcache HTTP fetch layer.
//!
//! This crate holds the pieces of the fetch engine that do not touch the
//! filesystem or the network:
//!
//! - **Identify** a logical request and hash it into a [`CacheKey`]
//! - **Decide** how long a response may be cached ([`TtlPolicy`])
//! - **Describe** requests, responses and results ([`Method`], [`Payload`],
//!   [`ResponseHeaders`], [`FetchResult`])
//! - **Call** the wire-level HTTP client through the [`Transport`] trait
//!
//! Storage lives in `fetchcache-fs`, orchestration in `fetchcache`.

pub mod headers;
pub mod key;
pub mod policy;
pub mod request;
pub mod result;
pub mod transport;

pub use headers::ResponseHeaders;
pub use key::{CacheKey, RequestIdentity};
pub use policy::{TtlDecision, TtlPolicy};
pub use request::{InvalidMethod, Method, Payload};
pub use result::{FetchResult, Origin};
pub use transport::{RawResponse, Transport, TransportError, TransportErrorKind, TransportRequest};

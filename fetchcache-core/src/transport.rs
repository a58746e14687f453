//! The seam between the fetch engine and a wire-level HTTP client.
//!
//! The engine never talks to the network itself. It hands a fully prepared
//! [`TransportRequest`] to a [`Transport`] and gets back either a
//! [`RawResponse`] or a classified [`TransportError`]. Client-wide settings
//! (redirects, timeouts, TLS trust anchors, connection reuse) are fixed when
//! the transport is built and are not part of the request.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::request::Method;

/// Boxed error used as the underlying cause of a [`TransportError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One prepared HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    /// Request method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Header name/value pairs in send order.
    pub headers: Vec<(String, String)>,
    /// Encoded request body, present for POST only.
    pub body: Option<String>,
    /// User-agent to send.
    pub user_agent: String,
    /// Cookie file to read cookies from and append new cookies to.
    pub cookie_file: Option<PathBuf>,
}

/// Response as produced by the transport, before any cache processing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Header name/value pairs in arrival order, duplicates kept.
    pub headers: Vec<(String, String)>,
    /// Decoded response body.
    pub body: Bytes,
}

/// Classification of a failed transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// The host name could not be resolved.
    DnsResolution,
    /// The TCP connection could not be established.
    Connect,
    /// TLS handshake or certificate verification failed.
    Tls,
    /// The request did not finish within the configured timeout.
    Timeout,
    /// The redirect limit was exceeded.
    TooManyRedirects,
    /// Reading or decoding the response body failed.
    Body,
    /// The request could not be built or sent.
    Request,
    /// Anything else.
    Other,
}

impl TransportErrorKind {
    /// Stable snake-case code, as stored in results and diagnostics.
    pub const fn code(&self) -> &'static str {
        match self {
            TransportErrorKind::DnsResolution => "dns_resolution",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Tls => "tls",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::TooManyRedirects => "too_many_redirects",
            TransportErrorKind::Body => "body",
            TransportErrorKind::Request => "request",
            TransportErrorKind::Other => "other",
        }
    }

    /// Whether the engine retries calls failing with this kind.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, TransportErrorKind::DnsResolution)
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A failed transport call.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    /// What went wrong.
    pub kind: TransportErrorKind,
    /// Human-readable detail.
    pub message: String,
    /// Time spent on the attempt before it failed.
    pub elapsed: Duration,
    /// Status of the last response received before the failure, if any.
    pub status: Option<u16>,
    #[source]
    source: Option<BoxError>,
}

impl TransportError {
    /// Creates an error without an underlying cause.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            elapsed: Duration::ZERO,
            status: None,
            source: None,
        }
    }

    /// Attaches the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Records how long the attempt took.
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// Records the status of the response the failure happened on.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// Executes prepared requests against the network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs one HTTP exchange. Never retries on its own.
    async fn execute(&self, request: TransportRequest) -> Result<RawResponse, TransportError>;
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn execute(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
        self.as_ref().execute(request).await
    }
}

#[async_trait]
impl<T> Transport for &T
where
    T: Transport + ?Sized,
{
    async fn execute(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
        (**self).execute(request).await
    }
}

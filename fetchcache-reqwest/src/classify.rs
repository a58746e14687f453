use std::error::Error as _;

use fetchcache_core::{TransportError, TransportErrorKind};

const DNS_MARKERS: &[&str] = &[
    "dns error",
    "failed to lookup address",
    "name or service not known",
    "no such host",
    "nodename nor servname",
    "temporary failure in name resolution",
];

const TLS_MARKERS: &[&str] = &["certificate", "tls", "handshake", "invalid peer"];

/// Maps a reqwest failure onto the engine's error kinds.
pub(crate) fn transport_error(error: reqwest::Error) -> TransportError {
    let chain = error_chain(&error);
    let kind = classify(&error, &chain);
    TransportError::new(kind, chain).with_source(error)
}

fn classify(error: &reqwest::Error, chain: &str) -> TransportErrorKind {
    if error.is_timeout() {
        return TransportErrorKind::Timeout;
    }
    if error.is_redirect() {
        return TransportErrorKind::TooManyRedirects;
    }
    if let Some(kind) = kind_from_chain(chain) {
        return kind;
    }
    if error.is_connect() {
        TransportErrorKind::Connect
    } else if error.is_body() || error.is_decode() {
        TransportErrorKind::Body
    } else if error.is_builder() || error.is_request() {
        TransportErrorKind::Request
    } else {
        TransportErrorKind::Other
    }
}

// hyper reports resolver and handshake failures as plain connect errors,
// only the message chain tells them apart.
fn kind_from_chain(chain: &str) -> Option<TransportErrorKind> {
    let lower = chain.to_ascii_lowercase();
    if DNS_MARKERS.iter().any(|m| lower.contains(m)) {
        Some(TransportErrorKind::DnsResolution)
    } else if TLS_MARKERS.iter().any(|m| lower.contains(m)) {
        Some(TransportErrorKind::Tls)
    } else {
        None
    }
}

fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

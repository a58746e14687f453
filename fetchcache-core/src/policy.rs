//! TTL policy: how long a response may stay on disk.
//!
//! This module provides:
//!
//! - [`TtlDecision`] - What the response headers alone say
//! - [`TtlPolicy`] - Header decision combined with the forced override
//!
//! ## Header rules
//!
//! Evaluated in order, the first match wins:
//!
//! 1. `cache-control` has `no-cache`, `no-store` or `max-age=0`: forbidden
//! 2. `cache-control` has `max-age=N`: `N` seconds
//! 3. `expires` is in the past, non-positive or unparseable: 0
//! 4. `expires` is in the future: seconds until then
//! 5. no signal at all: 0
//!
//! ## Forced override
//!
//! A positive `forced_max_age` can only extend caching: the result is the
//! larger of the override and the header value. Whether it may also cache a
//! response the headers forbid is controlled by `override_forbidden`.
//! A negative `forced_max_age` turns caching off for the whole engine.
//!
//! ```
//! use chrono::Utc;
//! use fetchcache_core::{ResponseHeaders, TtlPolicy};
//!
//! let headers: ResponseHeaders = [("Cache-Control", "public, max-age=60")]
//!     .into_iter()
//!     .collect();
//!
//! assert_eq!(TtlPolicy::default().resolve(&headers, Utc::now()), 60);
//! assert_eq!(TtlPolicy::forced(3600).resolve(&headers, Utc::now()), 3600);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::headers::ResponseHeaders;

/// TTL derived from response headers only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlDecision {
    /// The response explicitly forbids caching.
    Forbidden,
    /// The response may be cached for this many seconds (0 means no signal
    /// or an already expired response).
    Seconds(u64),
}

impl TtlDecision {
    /// Applies the header rules to `headers` as of `now`.
    pub fn from_headers(headers: &ResponseHeaders, now: DateTime<Utc>) -> Self {
        let mut max_age = None;
        for directive in cache_control_directives(headers) {
            match directive.as_str() {
                "no-cache" | "no-store" => return TtlDecision::Forbidden,
                other => {
                    if let Some(value) = other.strip_prefix("max-age=")
                        && let Ok(secs) = value.trim_matches('"').parse::<u64>()
                    {
                        if secs == 0 {
                            return TtlDecision::Forbidden;
                        }
                        max_age.get_or_insert(secs);
                    }
                }
            }
        }

        if let Some(secs) = max_age {
            return TtlDecision::Seconds(secs);
        }

        match headers.get("expires") {
            Some(expires) => TtlDecision::Seconds(seconds_until(expires, now)),
            None => TtlDecision::Seconds(0),
        }
    }

    /// Seconds to cache, treating a forbidden response as 0.
    pub fn seconds(&self) -> u64 {
        match self {
            TtlDecision::Forbidden => 0,
            TtlDecision::Seconds(secs) => *secs,
        }
    }
}

fn cache_control_directives(headers: &ResponseHeaders) -> impl Iterator<Item = String> + '_ {
    headers
        .get_all("cache-control")
        .iter()
        .flat_map(|value| value.split(','))
        .map(|directive| directive.trim().to_ascii_lowercase())
        .filter(|directive| !directive.is_empty())
}

fn seconds_until(expires: &str, now: DateTime<Utc>) -> u64 {
    let expires = expires.trim();

    // `Expires: 0` and `Expires: -1` are common ways to say "already expired".
    if expires.parse::<i64>().is_ok() {
        return 0;
    }

    match DateTime::parse_from_rfc2822(expires) {
        Ok(at) => {
            let remaining = at.with_timezone(&Utc) - now;
            u64::try_from(remaining.num_seconds()).unwrap_or(0)
        }
        Err(_) => 0,
    }
}

/// Combines the header rules with the configured override.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlPolicy {
    /// `0` follows the headers, `> 0` is a floor on the TTL, `< 0` disables
    /// caching entirely.
    pub forced_max_age: i64,
    /// Lets a positive `forced_max_age` cache responses whose headers say
    /// `no-cache`, `no-store` or `max-age=0`.
    pub override_forbidden: bool,
}

impl TtlPolicy {
    /// Policy with a forced max-age and the default `override_forbidden`.
    pub fn forced(forced_max_age: i64) -> Self {
        Self {
            forced_max_age,
            ..Self::default()
        }
    }

    /// Whether the cache is consulted and written at all.
    pub fn caching_enabled(&self) -> bool {
        self.forced_max_age >= 0
    }

    /// Resolves the TTL in seconds for a response with `headers`.
    pub fn resolve(&self, headers: &ResponseHeaders, now: DateTime<Utc>) -> u64 {
        if !self.caching_enabled() {
            return 0;
        }
        let forced = u64::try_from(self.forced_max_age).unwrap_or(0);

        match TtlDecision::from_headers(headers, now) {
            TtlDecision::Forbidden if self.override_forbidden => forced,
            TtlDecision::Forbidden => 0,
            TtlDecision::Seconds(secs) => secs.max(forced),
        }
    }
}

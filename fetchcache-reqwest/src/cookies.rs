//! Cookie file persistence.
//!
//! A cookie file holds one JSON record per line. Each record keeps the URL
//! the cookie came from and its attributes, with `Max-Age` turned into an
//! absolute expiry when the cookie is received. Every write rewrites the
//! file: the newest record per (name, domain, path) wins and expired
//! records are dropped.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::Url;
use reqwest::cookie::Jar;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// One persisted cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredCookie {
    origin: String,
    name: String,
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(default)]
    secure: bool,
    #[serde(default)]
    http_only: bool,
    /// Unix seconds; `None` for session cookies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires: Option<u64>,
}

impl StoredCookie {
    /// Captures a cookie received from `origin` at `now` (unix seconds).
    pub(crate) fn received(cookie: &reqwest::cookie::Cookie<'_>, origin: &Url, now: u64) -> Self {
        let expires = match cookie.max_age() {
            Some(max_age) => Some(now.saturating_add(max_age.as_secs())),
            None => cookie.expires().map(unix_seconds),
        };
        Self {
            origin: origin.to_string(),
            name: cookie.name().to_string(),
            value: cookie.value().to_string(),
            domain: cookie.domain().map(str::to_string),
            path: cookie.path().map(str::to_string),
            secure: cookie.secure(),
            http_only: cookie.http_only(),
            expires,
        }
    }

    fn is_expired_at(&self, now: u64) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }

    fn slot(&self) -> (&str, String, String) {
        let origin = Url::parse(&self.origin).ok();
        let domain = match &self.domain {
            Some(domain) => domain.trim_start_matches('.').to_ascii_lowercase(),
            None => origin
                .as_ref()
                .and_then(|url| url.host_str())
                .unwrap_or_default()
                .to_ascii_lowercase(),
        };
        let path = match &self.path {
            Some(path) => path.clone(),
            None => origin.as_ref().map_or_else(|| "/".to_string(), default_path),
        };
        (&self.name, domain, path)
    }

    /// `Set-Cookie` value for this record as seen at `now`, with the
    /// remaining lifetime as `Max-Age`.
    fn header_at(&self, now: u64) -> String {
        let mut header = format!("{}={}", self.name, self.value);
        if let Some(path) = &self.path {
            header.push_str("; Path=");
            header.push_str(path);
        }
        if let Some(domain) = &self.domain {
            header.push_str("; Domain=");
            header.push_str(domain);
        }
        if let Some(expires) = self.expires {
            header.push_str(&format!("; Max-Age={}", expires.saturating_sub(now)));
        }
        if self.secure {
            header.push_str("; Secure");
        }
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        header
    }

    /// Adds this record to `jar`. An expired record removes the cookie.
    pub(crate) fn apply(&self, jar: &Jar, now: u64) {
        if let Ok(origin) = Url::parse(&self.origin) {
            jar.add_cookie_str(&self.header_at(now), &origin);
        }
    }
}

/// Current time in unix seconds.
pub(crate) fn now() -> u64 {
    unix_seconds(SystemTime::now())
}

fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

// RFC 6265 5.1.4 default-path.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => path[..index].to_string(),
    }
}

fn parse_records(content: &str) -> Vec<StoredCookie> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

/// Folds `received` into `existing`: a newer record replaces the one in the
/// same slot, and expired records are dropped.
fn merge(existing: Vec<StoredCookie>, received: &[StoredCookie], now: u64) -> Vec<StoredCookie> {
    let mut merged: Vec<StoredCookie> = Vec::with_capacity(existing.len() + received.len());
    for record in existing.into_iter().chain(received.iter().cloned()) {
        merged.retain(|kept| kept.slot() != record.slot());
        merged.push(record);
    }
    merged.retain(|record| !record.is_expired_at(now));
    merged
}

async fn read_records(path: &Path) -> std::io::Result<Option<Vec<StoredCookie>>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(parse_records(&content))),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error),
    }
}

/// Loads the cookie file at `path` into a fresh jar as of `now`. A missing
/// file is created empty.
pub(crate) async fn load(path: &Path, now: u64) -> Jar {
    let jar = Jar::default();
    match read_records(path).await {
        Ok(Some(records)) => {
            for record in records.iter().filter(|r| !r.is_expired_at(now)) {
                record.apply(&jar, now);
            }
        }
        Ok(None) => {
            if let Err(error) = tokio::fs::write(path, b"").await {
                warn!(path = %path.display(), %error, "Unable to create cookie file");
            }
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "Unreadable cookie file ignored");
        }
    }
    jar
}

/// Merges `received` into the file at `path` and rewrites it.
pub(crate) async fn persist(path: &Path, received: &[StoredCookie], now: u64) -> std::io::Result<()> {
    let existing = read_records(path).await?.unwrap_or_default();
    let merged = merge(existing, received, now);

    let mut content = String::new();
    for record in &merged {
        content.push_str(&serde_json::to_string(record)?);
        content.push('\n');
    }
    tokio::fs::write(path, content).await?;
    trace!(path = %path.display(), stored = merged.len(), "Cookies persisted");
    Ok(())
}

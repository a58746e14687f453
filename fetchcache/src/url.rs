//! URL shape check.

use lazy_static::lazy_static;
use regex::Regex;
use ::url::Url;

use crate::FetchError;

lazy_static! {
    // Scheme, RFC 1123 host labels, optional port, then a path starting with `/`.
    static ref URL_SHAPE: Regex = Regex::new(
        r"^https?://([a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])(\.([a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9\-]{0,61}[a-zA-Z0-9]))*(:\d{1,5})?/\S*$"
    )
    .expect("valid URL shape regex");
}

/// A URL that passed the shape check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TargetUrl {
    raw: String,
    host: String,
    secure: bool,
}

impl TargetUrl {
    pub(crate) fn parse(raw: &str) -> Result<Self, FetchError> {
        if !URL_SHAPE.is_match(raw) {
            return Err(FetchError::InvalidRequest(format!("malformed URL {raw:?}")));
        }
        let parsed = Url::parse(raw)
            .map_err(|e| FetchError::InvalidRequest(format!("malformed URL {raw:?}: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| FetchError::InvalidRequest(format!("URL {raw:?} has no host")))?
            .to_string();

        Ok(Self {
            raw: raw.to_string(),
            host,
            secure: parsed.scheme() == "https",
        })
    }

    /// The URL exactly as given by the caller.
    pub(crate) fn as_str(&self) -> &str {
        &self.raw
    }

    /// Lower-cased host name.
    pub(crate) fn host(&self) -> &str {
        &self.host
    }

    pub(crate) fn is_secure(&self) -> bool {
        self.secure
    }
}

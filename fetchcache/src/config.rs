//! Engine configuration.
//!
//! [`FetchConfig`] is plain serde data. Every field has a default, so a YAML
//! document only needs the options it changes:
//!
//! ```
//! use fetchcache::FetchConfig;
//! use std::time::Duration;
//!
//! let config = FetchConfig::from_yaml(
//!     r#"
//! cache_dir: /tmp/fetchcache-doc
//! forced_max_age: 3600
//! timeout: 10s
//! headers:
//!   - "Accept: text/html"
//! "#,
//! )?;
//!
//! assert_eq!(config.forced_max_age, 3600);
//! assert_eq!(config.timeout, Duration::from_secs(10));
//! assert_eq!(config.connect_timeout(), Duration::from_secs(10));
//! assert_eq!(config.max_retries, 20);
//! # Ok::<(), fetchcache::FetchError>(())
//! ```

use std::path::PathBuf;
use std::time::Duration;

use fetchcache_core::TtlPolicy;
use serde::{Deserialize, Serialize};

use crate::FetchError;

/// User-agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = concat!("fetchcache/", env!("CARGO_PKG_VERSION"));

/// Upper bound accepted for `max_redirects`.
pub const MAX_REDIRECTS_LIMIT: u32 = 50;

/// Options of a [`FetchEngine`](crate::FetchEngine) and of the transport
/// built for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Directory holding response entries and cookie jars.
    pub cache_dir: PathBuf,
    /// `0` follows response headers, `> 0` is a TTL floor, `< 0` disables
    /// caching.
    pub forced_max_age: i64,
    /// Lets `forced_max_age` cache responses marked `no-store`/`no-cache`.
    pub override_forbidden: bool,
    /// Persist cookies per host.
    pub cookies_enabled: bool,
    /// Lifetime of a cookie jar in seconds.
    pub cookie_max_age: u64,
    /// PEM bundle of trust anchors, required for `https` URLs.
    pub ca_file: Option<PathBuf>,
    /// Overall request timeout (e.g. "30s").
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Connect timeout, defaults to `timeout`.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,
    /// Redirects to follow, `0` disables following.
    pub max_redirects: u32,
    /// User-agent, defaults to [`DEFAULT_USER_AGENT`].
    pub user_agent: Option<String>,
    /// Extra request headers as `Name: value` lines, sent in order.
    pub headers: Vec<String>,
    /// Return transport failures as errors instead of degraded results.
    pub strict: bool,
    /// Purge expired files before every fetch.
    pub purge_on_request: bool,
    /// Retries after a name resolution failure.
    pub max_retries: u32,
    /// Fixed delay between retries (e.g. "1s").
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
    /// Speak HTTP/1.1 only.
    pub http1_only: bool,
    /// Open a fresh connection for every request.
    pub forbid_reuse: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("fetchcache"),
            forced_max_age: 0,
            override_forbidden: false,
            cookies_enabled: true,
            cookie_max_age: 30 * 24 * 60 * 60,
            ca_file: None,
            timeout: Duration::from_secs(30),
            connect_timeout: None,
            max_redirects: 5,
            user_agent: None,
            headers: Vec::new(),
            strict: false,
            purge_on_request: false,
            max_retries: 20,
            retry_delay: Duration::from_secs(1),
            http1_only: true,
            forbid_reuse: true,
        }
    }
}

impl FetchConfig {
    /// Parses and validates a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, FetchError> {
        let config: Self = serde_saphyr::from_str(yaml)
            .map_err(|e| FetchError::Configuration(format!("invalid YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects option combinations the engine cannot honour.
    pub fn validate(&self) -> Result<(), FetchError> {
        if self.max_redirects > MAX_REDIRECTS_LIMIT {
            return Err(FetchError::Configuration(format!(
                "max_redirects must be at most {MAX_REDIRECTS_LIMIT}, got {}",
                self.max_redirects
            )));
        }
        if self.timeout.is_zero() {
            return Err(FetchError::Configuration("timeout must be positive".into()));
        }
        if self.connect_timeout.is_some_and(|t| t.is_zero()) {
            return Err(FetchError::Configuration(
                "connect_timeout must be positive".into(),
            ));
        }
        self.header_pairs()?;
        Ok(())
    }

    /// User-agent to send.
    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }

    /// Effective connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout.unwrap_or(self.timeout)
    }

    /// TTL policy derived from `forced_max_age` and `override_forbidden`.
    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy {
            forced_max_age: self.forced_max_age,
            override_forbidden: self.override_forbidden,
        }
    }

    /// Splits the configured header lines into name/value pairs.
    pub fn header_pairs(&self) -> Result<Vec<(String, String)>, FetchError> {
        self.headers.iter().map(|line| parse_header_line(line)).collect()
    }
}

fn parse_header_line(line: &str) -> Result<(String, String), FetchError> {
    let invalid = || FetchError::Configuration(format!("malformed header line {line:?}"));

    let (name, value) = line.split_once(':').ok_or_else(invalid)?;
    let name = name.trim();
    if name.is_empty() || !name.bytes().all(is_token_byte) {
        return Err(invalid());
    }
    let value = value.trim();
    if value.bytes().any(|b| b == b'\r' || b == b'\n') {
        return Err(invalid());
    }
    Ok((name.to_string(), value.to_string()))
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

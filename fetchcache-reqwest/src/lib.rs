#![warn(missing_docs)]
//! # fetchcache-reqwest
//!
//! A [`Transport`](fetchcache_core::Transport) for `fetchcache` built on
//! [`reqwest`].
//!
//! ```no_run
//! use fetchcache::FetchConfig;
//!
//! # async fn run() -> Result<(), fetchcache::FetchError> {
//! let engine = fetchcache_reqwest::engine(FetchConfig::default())?;
//! let page = engine.get("http://example.test/").await?;
//! println!("{} {}", page.status, page.origin);
//! # Ok(())
//! # }
//! ```
//!
//! Redirects are followed by the transport itself, hop by hop, so cookies
//! set on intermediate responses reach the per-host cookie file.

mod classify;
mod cookies;
mod transport;

pub use transport::ReqwestTransport;

use fetchcache::{FetchConfig, FetchEngine, FetchError};

/// Builds a [`FetchEngine`] backed by a [`ReqwestTransport`] for `config`.
pub fn engine(config: FetchConfig) -> Result<FetchEngine<ReqwestTransport>, FetchError> {
    let transport = ReqwestTransport::from_config(&config)?;
    FetchEngine::new(config, transport)
}
